//! Macrotasks: cancellable deferred tasks tracked by their owning context.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::Context;
use super::timer::TimerHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroTaskOptions {
    /// Periodic tasks may be invoked repeatedly and stay pending until
    /// cancelled. One-shot tasks complete on their first invocation.
    pub periodic: bool,
}

impl MacroTaskOptions {
    /// A task that completes on first invocation.
    pub fn once() -> Self {
        Self { periodic: false }
    }

    /// A task that stays pending until cancelled.
    pub fn periodic() -> Self {
        Self { periodic: true }
    }
}

#[derive(Clone)]
pub struct MacroTask {
    inner: Arc<MacroTaskInner>,
}

struct MacroTaskInner {
    name: String,
    context: Context,
    callback: Arc<dyn Fn() + Send + Sync>,
    periodic: bool,
    done: Mutex<bool>,
    timer: Mutex<Option<TimerHandle>>,
    invocations: AtomicU64,
}

impl MacroTask {
    pub(crate) fn new(
        name: String,
        context: Context,
        callback: Arc<dyn Fn() + Send + Sync>,
        options: MacroTaskOptions,
    ) -> Self {
        Self {
            inner: Arc::new(MacroTaskInner {
                name,
                context,
                callback,
                periodic: options.periodic,
                done: Mutex::new(false),
                timer: Mutex::new(None),
                invocations: AtomicU64::new(0),
            }),
        }
    }

    /// Arm `timer` for this task. A task that already completed or was
    /// cancelled cancels the timer instead.
    pub(crate) fn attach_timer(&self, timer: TimerHandle) {
        let done = self.inner.done.lock();
        if *done {
            timer.cancel();
            return;
        }
        *self.inner.timer.lock() = Some(timer);
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn is_periodic(&self) -> bool {
        self.inner.periodic
    }

    /// Completed (one-shot) or cancelled.
    pub fn is_done(&self) -> bool {
        *self.inner.done.lock()
    }

    /// How many times the callback has run.
    pub fn invocations(&self) -> u64 {
        self.inner.invocations.load(Ordering::SeqCst)
    }

    /// Run the callback inside the owning context.
    ///
    /// No-op once the task is done. A one-shot task is marked complete
    /// before its callback runs, so the context can settle at the end of
    /// that same run.
    pub fn invoke(&self) {
        {
            let mut done = self.inner.done.lock();
            if *done {
                return;
            }
            if !self.inner.periodic {
                *done = true;
            }
        }
        if !self.inner.periodic {
            self.disarm();
            self.inner.context.macro_task_finished();
        }
        self.inner.invocations.fetch_add(1, Ordering::SeqCst);
        let callback = Arc::clone(&self.inner.callback);
        self.inner.context.run(|| callback());
    }

    /// Disarm the timer and release the pending slot. Idempotent.
    pub fn cancel(&self) {
        {
            let mut done = self.inner.done.lock();
            if *done {
                return;
            }
            *done = true;
        }
        self.disarm();
        self.inner.context.macro_task_finished();
        self.inner.context.settle();
    }

    fn disarm(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.cancel();
        }
    }
}

impl fmt::Debug for MacroTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroTask")
            .field("name", &self.inner.name)
            .field("context", &self.inner.context.id())
            .field("periodic", &self.inner.periodic)
            .field("done", &self.is_done())
            .finish()
    }
}
