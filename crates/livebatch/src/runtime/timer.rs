//! Timer primitive behind every deferred task in the crate.
//!
//! [`TokioTimers`] spawns one task per timeout onto the Tokio runtime that
//! was current when it was constructed. With a current-thread runtime every
//! callback runs on the same thread as the code that scheduled it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// A one-shot deferred callback.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks after a delay.
pub trait TimerHost: Send + Sync {
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Cancellation capability for a scheduled timeout.
///
/// `cancel()` is idempotent and a no-op once the timeout has fired.
#[derive(Clone)]
pub struct TimerHandle {
    inner: Arc<TimerState>,
}

struct TimerState {
    done: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
}

impl TimerHandle {
    /// A handle with no runtime task attached. Custom [`TimerHost`]s hand
    /// this out and run the task only if [`TimerHandle::claim`] succeeds.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TimerState {
                done: AtomicBool::new(false),
                abort: Mutex::new(None),
            }),
        }
    }

    /// Stop the timer from firing. Safe to call after it fired.
    pub fn cancel(&self) {
        if self.inner.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(abort) = self.inner.abort.lock().take() {
            abort.abort();
        }
    }

    /// Whether the timeout fired or was cancelled.
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Claim the right to run. Returns `false` if already cancelled or
    /// fired.
    pub fn claim(&self) -> bool {
        !self.inner.done.swap(true, Ordering::SeqCst)
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

// ============================================================================
// TokioTimers
// ============================================================================

/// Timer host backed by `tokio::time::sleep` on a runtime handle.
pub struct TokioTimers {
    handle: Handle,
}

impl TokioTimers {
    /// Bind to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// Spawn timers onto `handle` instead of the current runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl TimerHost for TokioTimers {
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let timer = TimerHandle::new();
        let guard = timer.clone();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if guard.claim() {
                task();
            }
        });
        let mut abort = timer.inner.abort.lock();
        if !timer.is_done() {
            *abort = Some(join.abort_handle());
        }
        drop(abort);
        timer
    }
}
