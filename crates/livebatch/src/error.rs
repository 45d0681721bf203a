use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

/// An error reported by a live query through its own callback channel.
///
/// Cloned once per sink when propagated, so it carries only owned strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Live query error: {}", self.message)
    }
}

impl std::error::Error for QueryError {}

// ---------------------------------------------------------------------------
// CallError
// ---------------------------------------------------------------------------

/// Error delivered to request/response callbacks (method calls, subscriptions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Call \"{method}\" failed: {reason}")]
pub struct CallError {
    pub method: String,
    pub reason: String,
}

impl CallError {
    pub fn new(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// LiveError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LiveError {
    /// A construction-time capability check failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Crate-wide result; the default error type is `LiveError`.
pub type Result<T, E = LiveError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
