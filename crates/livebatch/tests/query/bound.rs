//! ContextBoundQuery: callbacks run in the root context and resume the
//! observing context once per burst.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use livebatch::query::{
    ContextBoundQuery, LiveQuery, MemoryLiveQuery, ObserveCallbacks, ObserveChangesCallbacks,
    SharedQuery,
};
use livebatch::runtime::timer::TimerTask;
use livebatch::runtime::{Context, Host, TimerHandle, TimerHost};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn burst_of_callbacks_resumes_owner_once() {
    let host = Host::tokio();
    let memory = Arc::new(MemoryLiveQuery::new());
    let inner: SharedQuery = memory.clone();
    let bound = ContextBoundQuery::new(inner, host.scheduler().clone());
    let ctx = Context::new("todos");
    let in_root = Arc::new(Mutex::new(Vec::new()));

    let r = in_root.clone();
    let _handle = ctx.run(|| {
        bound.observe(ObserveCallbacks::default().added_at(move |_, _| {
            r.lock().push(Context::current().map(|c| c.is_root()));
        }))
    });
    let runs_before = ctx.run_count();

    memory.insert(json!({"_id": 1}));
    memory.insert(json!({"_id": 2}));
    memory.insert(json!({"_id": 3}));

    assert_eq!(*in_root.lock(), vec![Some(true); 3]);
    assert!(host.scheduler().is_pending(&ctx));

    sleep(ms(5)).await;

    assert_eq!(ctx.run_count(), runs_before + 1);
    assert_eq!(host.scheduler().resumptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn observing_outside_a_context_binds_to_root() {
    let host = Host::tokio();
    let memory = Arc::new(MemoryLiveQuery::new());
    let inner: SharedQuery = memory.clone();
    let bound = ContextBoundQuery::new(inner, host.scheduler().clone());
    let hits = Arc::new(AtomicUsize::new(0));

    let h = hits.clone();
    let _handle = bound.observe(ObserveCallbacks::default().added_at(move |_, _| {
        h.fetch_add(1, Ordering::SeqCst);
    }));
    memory.insert(json!({"_id": "a"}));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(host.scheduler().pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn observe_changes_is_bound_too() {
    let host = Host::tokio();
    let memory = Arc::new(MemoryLiveQuery::new());
    let inner: SharedQuery = memory.clone();
    let bound = ContextBoundQuery::new(inner, host.scheduler().clone());
    let ctx = Context::new("detail");
    let removed = Arc::new(Mutex::new(Vec::new()));

    memory.insert(json!({"_id": "x", "n": 1}));
    let r = removed.clone();
    let _handle = ctx.run(|| {
        bound.observe_changes(
            ObserveChangesCallbacks::default().removed(move |id| r.lock().push(id.clone())),
        )
    });
    let runs_before = ctx.run_count();

    memory.remove(&json!("x"));
    sleep(ms(5)).await;

    assert_eq!(*removed.lock(), vec![json!("x")]);
    assert_eq!(ctx.run_count(), runs_before + 1);
}

#[test]
fn fetch_and_capabilities_pass_through() {
    let timers: Arc<dyn TimerHost> = Arc::new(NoTimers);
    let host = Host::new(timers);
    let memory = Arc::new(MemoryLiveQuery::with_docs(vec![json!({"_id": 1})]));
    let inner: SharedQuery = memory.clone();
    let bound = ContextBoundQuery::new(inner, host.scheduler().clone());

    assert_eq!(bound.fetch(), vec![json!({"_id": 1})]);
    assert!(bound.capabilities().observe);
    assert_eq!(memory.fetch_calls(), 1);
}

/// Timer host that never fires; enough for synchronous paths.
struct NoTimers;

impl TimerHost for NoTimers {
    fn set_timeout(&self, _delay: Duration, _task: TimerTask) -> TimerHandle {
        TimerHandle::new()
    }
}
