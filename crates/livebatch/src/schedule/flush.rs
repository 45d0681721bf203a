//! FlushScheduler: coalesces "please resume context C soon" requests.
//!
//! However many sources ask for a context to be resumed, at most one
//! resumption task is pending per context. A new request cancels the pending
//! task and installs a fresh one (last writer wins, the timer restarts).
//! When the task fires it:
//!   1. runs the context once so its queued work executes,
//!   2. drains the after-run callbacks registered for that context, newest
//!      first,
//!   3. forgets the pending entry.
//!
//! The root context never needs resuming; requests for it are ignored.
//!
//! All state lives in one `parking_lot::Mutex` that is released before any
//! context run or callback, so callbacks may schedule again re-entrantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::runtime::context::{Context, ContextId};
use crate::runtime::macrotask::{MacroTask, MacroTaskOptions};
use crate::runtime::timer::TimerHost;

/// A callback deferred until after a context resumes.
pub type AfterRun = Box<dyn FnOnce() + Send + 'static>;

/// Coalesces resumption requests to one pending task per context.
pub struct FlushScheduler {
    root: Context,
    timers: Arc<dyn TimerHost>,
    delay: Duration,
    state: Arc<Mutex<FlushState>>,
}

struct PendingRun {
    seq: u64,
    task: MacroTask,
}

#[derive(Default)]
struct FlushState {
    tasks: HashMap<ContextId, PendingRun>,
    after_run: HashMap<ContextId, Vec<AfterRun>>,
    next_seq: u64,
    resumptions: u64,
}

impl FlushScheduler {
    /// Scheduler with a zero-delay window.
    pub fn new(root: Context, timers: Arc<dyn TimerHost>) -> Self {
        Self::with_delay(root, timers, Duration::ZERO)
    }

    /// Like [`FlushScheduler::new`] with a non-zero coalescing window.
    pub fn with_delay(root: Context, timers: Arc<dyn TimerHost>, delay: Duration) -> Self {
        Self {
            root,
            timers,
            delay,
            state: Arc::new(Mutex::new(FlushState::default())),
        }
    }

    /// Context that resumption tasks are scheduled on.
    pub fn root(&self) -> &Context {
        &self.root
    }

    /// Request a resumption of `context`, replacing any pending request.
    pub fn schedule_run(&self, context: &Context) {
        if context.is_root() || *context == self.root {
            return;
        }

        let seq = {
            let mut st = self.state.lock();
            st.next_seq += 1;
            st.next_seq
        };

        let state = Arc::clone(&self.state);
        let target = context.clone();
        let task = self.root.schedule_macro_task(
            "runContexts",
            move || resume(&state, &target, seq),
            MacroTaskOptions::periodic(),
            |_| None,
        );

        // Register before arming: the timer may fire on another worker at once.
        let previous = self.state.lock().tasks.insert(
            context.id(),
            PendingRun {
                seq,
                task: task.clone(),
            },
        );
        if let Some(previous) = previous {
            trace!(context = context.name(), "cancelling pending context run");
            previous.task.cancel();
        }

        let armed = task.clone();
        task.attach_timer(
            self.timers
                .set_timeout(self.delay, Box::new(move || armed.invoke())),
        );
    }

    /// Run `callback` after the next resumption of `context`, or right away
    /// if none is pending.
    pub fn on_after_run(&self, context: &Context, callback: impl FnOnce() + Send + 'static) {
        {
            let mut st = self.state.lock();
            if st.tasks.contains_key(&context.id()) {
                st.after_run
                    .entry(context.id())
                    .or_default()
                    .push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Fire every pending resumption now instead of waiting for its timer.
    pub fn run_contexts(&self) {
        let tasks: Vec<MacroTask> = self
            .state
            .lock()
            .tasks
            .values()
            .map(|p| p.task.clone())
            .collect();
        for task in tasks {
            task.invoke();
        }
    }

    /// Run `f` in the root context, then request a resumption of `context`.
    pub fn run_bound<R>(&self, context: &Context, f: impl FnOnce() -> R) -> R {
        let out = self.root.run(f);
        self.schedule_run(context);
        out
    }

    /// Whether `context` has a pending resumption.
    pub fn is_pending(&self, context: &Context) -> bool {
        self.state.lock().tasks.contains_key(&context.id())
    }

    /// Number of contexts with a pending resumption.
    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Total resumptions performed.
    pub fn resumptions(&self) -> u64 {
        self.state.lock().resumptions
    }
}

fn resume(state: &Arc<Mutex<FlushState>>, context: &Context, seq: u64) {
    debug!(context = context.name(), "resuming context");
    context.run(|| {});
    state.lock().resumptions += 1;

    let id = context.id();
    let finished = loop {
        let mut st = state.lock();
        match st.after_run.get_mut(&id).and_then(|cbs| cbs.pop()) {
            Some(cb) => {
                drop(st);
                cb();
            }
            None => {
                st.after_run.remove(&id);
                let current = st.tasks.get(&id).is_some_and(|p| p.seq == seq);
                break if current { st.tasks.remove(&id) } else { None };
            }
        }
    };
    if let Some(pending) = finished {
        pending.task.cancel();
    }
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("root", &self.root)
            .field("delay", &self.delay)
            .field("pending", &self.pending())
            .finish()
    }
}
