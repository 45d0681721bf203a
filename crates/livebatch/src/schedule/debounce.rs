//! Trailing-edge debouncer with an "opened a new window" hook.
//!
//! Every [`Debouncer::trigger`] restarts the quiet window; the action fires
//! once `wait` elapses with no further trigger. When a trigger opens a new
//! window (nothing pending), `on_first` runs first and its result is handed
//! to the action when the window closes. Observers use that to capture a
//! pending macrotask at the start of a burst.
//!
//! A zero `wait` still defers to the timer, so all triggers made before the
//! event loop yields collapse into one action.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::runtime::timer::{TimerHandle, TimerHost};

/// Trailing-edge debouncer; see [`debounce`].
pub struct Debouncer<T> {
    inner: Arc<DebounceInner<T>>,
}

struct DebounceInner<T> {
    timers: Arc<dyn TimerHost>,
    wait: Duration,
    action: Arc<dyn Fn(T) + Send + Sync>,
    on_first: Arc<dyn Fn() -> T + Send + Sync>,
    state: Mutex<DebounceState<T>>,
}

struct DebounceState<T> {
    timer: Option<TimerHandle>,
    data: Option<T>,
    /// Bumped on every trigger; a timer only fires if it is still the latest.
    generation: u64,
    flushes: u64,
}

/// Build a debouncer. See the module docs for the firing rules.
pub fn debounce<T: Send + 'static>(
    timers: Arc<dyn TimerHost>,
    wait: Duration,
    action: impl Fn(T) + Send + Sync + 'static,
    on_first: impl Fn() -> T + Send + Sync + 'static,
) -> Debouncer<T> {
    Debouncer {
        inner: Arc::new(DebounceInner {
            timers,
            wait,
            action: Arc::new(action),
            on_first: Arc::new(on_first),
            state: Mutex::new(DebounceState {
                timer: None,
                data: None,
                generation: 0,
                flushes: 0,
            }),
        }),
    }
}

impl<T: Send + 'static> Debouncer<T> {
    /// Record a call, opening a window if none is open.
    pub fn trigger(&self) {
        let opening = self.inner.state.lock().timer.is_none();
        if opening {
            let data = (self.inner.on_first)();
            self.inner.state.lock().data = Some(data);
        }

        let mut st = self.inner.state.lock();
        if let Some(timer) = st.timer.take() {
            timer.cancel();
        }
        st.generation += 1;
        let generation = st.generation;
        let inner = Arc::clone(&self.inner);
        st.timer = Some(
            self.inner
                .timers
                .set_timeout(self.inner.wait, Box::new(move || inner.fire(generation))),
        );
    }

    /// Drop the open window without running the action.
    ///
    /// Returns the value captured by `on_first`, if a window was open, so
    /// the caller can release it.
    pub fn cancel(&self) -> Option<T> {
        let mut st = self.inner.state.lock();
        if let Some(timer) = st.timer.take() {
            timer.cancel();
        }
        st.generation += 1;
        st.data.take()
    }

    /// Whether a window is open.
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Number of times the action has fired.
    pub fn flushes(&self) -> u64 {
        self.inner.state.lock().flushes
    }

    /// Quiet period before a flush.
    pub fn wait(&self) -> Duration {
        self.inner.wait
    }
}

impl<T> DebounceInner<T> {
    fn fire(&self, generation: u64) {
        let data = {
            let mut st = self.state.lock();
            if st.generation != generation {
                return;
            }
            st.timer = None;
            st.flushes += 1;
            st.data.take()
        };
        if let Some(data) = data {
            (self.action)(data);
        }
    }
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
