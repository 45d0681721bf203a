//! Execution contexts: logical task-ordering domains on one event loop.
//!
//! A [`Context`] owns a FIFO queue of posted tasks and a count of pending
//! macrotasks. [`Context::run`] makes the context current for the duration
//! of a closure and then drains its queue, which is how pending work in a
//! context gets "resumed". Two contexts never share queue order.
//!
//! The current context is tracked per thread; code running outside any
//! `run` sees `Context::current() == None` and is treated as running in the
//! host's root context.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::emitter::{Emitter, ListenerId};
use super::macrotask::{MacroTask, MacroTaskOptions};
use super::timer::TimerHandle;

/// Opaque context identity.
pub type ContextId = u64;

/// A task posted to a context queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ContextId,
    name: String,
    root: bool,
    queue: Mutex<VecDeque<Task>>,
    pending_macro_tasks: AtomicUsize,
    runs: AtomicU64,
    stable: Emitter<ContextId>,
}

/// Pops the thread-local current-context stack on drop, so a panicking
/// closure inside `run` does not leave a stale current context behind.
struct Enter;

impl Enter {
    fn push(ctx: Context) -> Self {
        CURRENT.with(|stack| stack.borrow_mut().push(ctx));
        Enter
    }
}

impl Drop for Enter {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Context {
    fn build(name: String, root: bool) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                root,
                queue: Mutex::new(VecDeque::new()),
                pending_macro_tasks: AtomicUsize::new(0),
                runs: AtomicU64::new(0),
                stable: Emitter::new(),
            }),
        }
    }

    /// Create a root context. A host owns exactly one.
    pub fn root() -> Self {
        Self::build("root".to_string(), true)
    }

    /// Create a child context with a descriptive name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), false)
    }

    /// Unique identity of this context.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether this is the root context.
    pub fn is_root(&self) -> bool {
        self.inner.root
    }

    /// The innermost context entered on this thread, if any.
    pub fn current() -> Option<Context> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Run `f` with this context current, then drain the task queue.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let enter = Enter::push(self.clone());
        let out = f();
        self.drain();
        drop(enter);
        self.inner.runs.fetch_add(1, Ordering::SeqCst);
        self.settle();
        out
    }

    /// Queue `task` to run on the next resumption of this context.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.queue.lock().push_back(Box::new(task));
    }

    /// Number of completed `run` calls.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::SeqCst)
    }

    /// Tasks posted but not yet run.
    pub fn queued_tasks(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Macrotasks scheduled and not yet finished or cancelled.
    pub fn pending_macro_tasks(&self) -> usize {
        self.inner.pending_macro_tasks.load(Ordering::SeqCst)
    }

    /// No queued tasks and no pending macrotasks.
    pub fn is_stable(&self) -> bool {
        self.pending_macro_tasks() == 0 && self.queued_tasks() == 0
    }

    /// Register a listener fired whenever this context settles into a
    /// stable state.
    pub fn on_stable(&self, listener: impl Fn(&ContextId) + Send + Sync + 'static) -> ListenerId {
        self.inner.stable.on(listener)
    }

    /// Remove a stability listener. Returns false if it was unknown.
    pub fn off_stable(&self, id: ListenerId) -> bool {
        self.inner.stable.off(id)
    }

    /// Schedule a macrotask owned by this context.
    ///
    /// `on_schedule` arms whatever will eventually invoke the task (usually a
    /// timer) and may return the timer so that `cancel()` can disarm it. The
    /// task counts as pending until it completes or is cancelled.
    pub fn schedule_macro_task(
        &self,
        name: impl Into<String>,
        callback: impl Fn() + Send + Sync + 'static,
        options: MacroTaskOptions,
        on_schedule: impl FnOnce(&MacroTask) -> Option<TimerHandle>,
    ) -> MacroTask {
        self.inner.pending_macro_tasks.fetch_add(1, Ordering::SeqCst);
        let task = MacroTask::new(name.into(), self.clone(), Arc::new(callback), options);
        if let Some(timer) = on_schedule(&task) {
            task.attach_timer(timer);
        }
        task
    }

    pub(crate) fn macro_task_finished(&self) {
        let _ = self.inner.pending_macro_tasks.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
    }

    pub(crate) fn settle(&self) {
        if self.is_stable() {
            self.inner.stable.emit(&self.inner.id);
        }
    }

    fn drain(&self) {
        loop {
            let next = self.inner.queue.lock().pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .finish()
    }
}
