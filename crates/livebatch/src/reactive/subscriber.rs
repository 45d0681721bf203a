//! Subscriber sinks and the unsubscribe capability.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::QueryError;
use crate::types::Batch;

/// Receives each batch.
pub type NextFn = Arc<dyn Fn(&Batch) + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&QueryError) + Send + Sync>;
pub type CompleteFn = Arc<dyn Fn() + Send + Sync>;

/// A sink for batches.
///
/// `error` and `complete` are terminal: whichever arrives first closes the
/// sink and later deliveries of any kind are ignored. An error closes the
/// sink without invoking the completion handler.
#[derive(Clone)]
pub struct Subscriber {
    on_next: NextFn,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
    closed: Arc<AtomicBool>,
}

impl Subscriber {
    /// A sink that forwards batches to `on_next`.
    pub fn new(on_next: impl Fn(&Batch) + Send + Sync + 'static) -> Self {
        Self {
            on_next: Arc::new(on_next),
            on_error: None,
            on_complete: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle a terminal query error.
    pub fn on_error(mut self, f: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Handle completion.
    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Deliver a batch unless the sink is closed.
    pub fn next(&self, batch: &Batch) {
        if !self.is_closed() {
            (self.on_next)(batch);
        }
    }

    /// Deliver a terminal error and close the sink.
    pub fn error(&self, err: &QueryError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(f) = &self.on_error {
            f(err);
        }
    }

    /// Complete and close the sink.
    pub fn complete(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(f) = &self.on_complete {
            f();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Unsubscribe capability returned by every `subscribe`. Idempotent.
pub struct Subscription {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Subscription that runs `release` on the first unsubscribe.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A subscription with nothing to release.
    pub fn closed() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Release the registration. Idempotent.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.release.lock().is_none()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
