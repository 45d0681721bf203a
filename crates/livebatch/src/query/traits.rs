//! The live-query capability consumed by this crate.
//!
//! A live query exposes a snapshot (`fetch`) and two observation styles.
//! Callbacks are invoked synchronously by the query engine whenever its
//! result set changes; `observe` additionally reports every document already
//! in the result set through `added_at` before it returns.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::QueryError;
use crate::types::Document;

// ============================================================================
// Handles
// ============================================================================

/// Something that can be released. `stop` must tolerate repeated calls.
pub trait Stoppable: Send + Sync {
    fn stop(&self);
}

/// Handle returned by `observe` / `observe_changes`.
pub type LiveQueryHandle = Box<dyn Stoppable>;

/// A [`Stoppable`] that runs a closure on the first `stop`.
pub struct FnHandle {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FnHandle {
    /// Handle that runs `release` once on stop.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Like [`FnHandle::new`], boxed as a [`LiveQueryHandle`].
    pub fn boxed(release: impl FnOnce() + Send + 'static) -> LiveQueryHandle {
        Box::new(Self::new(release))
    }
}

impl Stoppable for FnHandle {
    fn stop(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }
}

// ============================================================================
// Callbacks
// ============================================================================

pub type AddedAtFn = Arc<dyn Fn(&Document, usize) + Send + Sync>;
pub type ChangedAtFn = Arc<dyn Fn(&Document, &Document, usize) + Send + Sync>;
pub type MovedToFn = Arc<dyn Fn(&Document, usize, usize) + Send + Sync>;
pub type RemovedAtFn = Arc<dyn Fn(&Document, usize) + Send + Sync>;
pub type QueryErrorFn = Arc<dyn Fn(&QueryError) + Send + Sync>;

/// Ordered, per-document callbacks for [`LiveQuery::observe`].
#[derive(Clone, Default)]
pub struct ObserveCallbacks {
    /// `(document, index)`
    pub added_at: Option<AddedAtFn>,
    /// `(new_document, old_document, index)`
    pub changed_at: Option<ChangedAtFn>,
    /// `(document, from_index, to_index)`
    pub moved_to: Option<MovedToFn>,
    /// `(old_document, index)`
    pub removed_at: Option<RemovedAtFn>,
    pub error: Option<QueryErrorFn>,
}

impl ObserveCallbacks {
    pub fn added_at(mut self, f: impl Fn(&Document, usize) + Send + Sync + 'static) -> Self {
        self.added_at = Some(Arc::new(f));
        self
    }

    pub fn changed_at(
        mut self,
        f: impl Fn(&Document, &Document, usize) + Send + Sync + 'static,
    ) -> Self {
        self.changed_at = Some(Arc::new(f));
        self
    }

    pub fn moved_to(mut self, f: impl Fn(&Document, usize, usize) + Send + Sync + 'static) -> Self {
        self.moved_to = Some(Arc::new(f));
        self
    }

    pub fn removed_at(mut self, f: impl Fn(&Document, usize) + Send + Sync + 'static) -> Self {
        self.removed_at = Some(Arc::new(f));
        self
    }

    pub fn error(mut self, f: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }
}

pub type AddedFn = Arc<dyn Fn(&Value, &Document) + Send + Sync>;
pub type ChangedFn = Arc<dyn Fn(&Value, &Document) + Send + Sync>;
pub type RemovedFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// Unordered, field-level callbacks for [`LiveQuery::observe_changes`].
#[derive(Clone, Default)]
pub struct ObserveChangesCallbacks {
    /// `(id, fields)`
    pub added: Option<AddedFn>,
    /// `(id, changed_fields)`
    pub changed: Option<ChangedFn>,
    /// `(id)`
    pub removed: Option<RemovedFn>,
    pub error: Option<QueryErrorFn>,
}

impl ObserveChangesCallbacks {
    pub fn added(mut self, f: impl Fn(&Value, &Document) + Send + Sync + 'static) -> Self {
        self.added = Some(Arc::new(f));
        self
    }

    pub fn changed(mut self, f: impl Fn(&Value, &Document) + Send + Sync + 'static) -> Self {
        self.changed = Some(Arc::new(f));
        self
    }

    pub fn removed(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.removed = Some(Arc::new(f));
        self
    }

    pub fn error(mut self, f: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }
}

// ============================================================================
// LiveQuery
// ============================================================================

/// Which observation styles a query supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub observe: bool,
    pub observe_changes: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            observe: true,
            observe_changes: true,
        }
    }
}

/// A query that reports incremental changes to its ordered result set.
pub trait LiveQuery: Send + Sync {
    /// The current result set, in order.
    fn fetch(&self) -> Vec<Document>;

    fn observe(&self, callbacks: ObserveCallbacks) -> LiveQueryHandle;

    fn observe_changes(&self, callbacks: ObserveChangesCallbacks) -> LiveQueryHandle;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// Shared reference to a live query. Identity is the allocation.
pub type SharedQuery = Arc<dyn LiveQuery>;

/// Whether `a` and `b` are the same live query instance.
pub fn same_query(a: &SharedQuery, b: &SharedQuery) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Whether `query` can back a `LiveQueryObserver`.
pub fn is_observable(query: &dyn LiveQuery) -> bool {
    query.capabilities().observe
}
