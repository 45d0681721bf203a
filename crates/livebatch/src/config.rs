//! Observer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::runtime::context::Context;

/// Default debounce window for live observation.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// How an observer reads its live query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObserveMode {
    /// Register per-document callbacks and stream debounced batches.
    #[default]
    Live,
    /// Fetch once on first subscription and emit a single batch of adds.
    FetchOnce,
}

/// Options for a `LiveQueryObserver`.
#[derive(Debug, Clone)]
pub struct ObserverOptions {
    /// Quiet period before a batch is flushed. Zero is legal.
    pub debounce: Duration,
    pub mode: ObserveMode,
    /// Context the observer resumes after each flush. `None` uses the
    /// context current at construction, or the host root.
    pub context: Option<Context>,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            mode: ObserveMode::Live,
            context: None,
        }
    }
}

impl ObserverOptions {
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce = Duration::from_millis(ms);
        self
    }

    pub fn mode(mut self, mode: ObserveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(ObserveMode::FetchOnce)`.
    pub fn fetch_once(self) -> Self {
        self.mode(ObserveMode::FetchOnce)
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}

/// Serializable settings, e.g. read from a host's JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveConfig {
    pub debounce_ms: u64,
    pub fetch_only: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            fetch_only: false,
        }
    }
}

impl LiveConfig {
    /// Parse a camelCase JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Observer options described by this config.
    pub fn observer_options(&self) -> ObserverOptions {
        let options = ObserverOptions::default().debounce_ms(self.debounce_ms);
        if self.fetch_only {
            options.fetch_once()
        } else {
            options
        }
    }
}
