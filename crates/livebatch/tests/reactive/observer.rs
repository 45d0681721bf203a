//! LiveQueryObserver tests: batching, ordering, modes and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use livebatch::config::ObserverOptions;
use livebatch::error::{LiveError, QueryError};
use livebatch::query::{Capabilities, LiveQuery, MemoryLiveQuery, SharedQuery};
use livebatch::reactive::{LiveQueryObserver, ObserverPhase, Subscriber};
use livebatch::runtime::{Context, Host};
use livebatch::types::ChangeRecord;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::{sleep, Instant};

// ============================================================================
// Helpers
// ============================================================================

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

type BatchLog = Arc<Mutex<Vec<Vec<ChangeRecord>>>>;

/// A sink that logs every batch.
fn logging_sink() -> (Subscriber, BatchLog) {
    let log: BatchLog = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    (Subscriber::new(move |batch| l.lock().push(batch.to_vec())), log)
}

fn observer_for(
    query: &Arc<MemoryLiveQuery>,
    host: &Host,
    options: ObserverOptions,
) -> LiveQueryObserver {
    let shared: SharedQuery = query.clone();
    LiveQueryObserver::new(shared, host, options).expect("observable query")
}

// ============================================================================
// Batching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn two_adds_ten_ms_apart_emit_one_batch() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default());

    let start = Instant::now();
    let emitted_at = Arc::new(Mutex::new(Vec::new()));
    let log: BatchLog = Arc::new(Mutex::new(Vec::new()));
    let (e, l) = (emitted_at.clone(), log.clone());
    let _sub = observer.subscribe(Subscriber::new(move |batch| {
        e.lock().push(start.elapsed());
        l.lock().push(batch.to_vec());
    }));

    query.insert(json!({"id": 1}));
    sleep(ms(10)).await;
    query.insert(json!({"id": 2}));

    sleep(ms(45)).await;
    assert!(log.lock().is_empty(), "nothing before the window closes");

    sleep(ms(40)).await;
    assert_eq!(
        *log.lock(),
        vec![vec![
            ChangeRecord::add(0, json!({"id": 1})),
            ChangeRecord::add(1, json!({"id": 2})),
        ]]
    );
    let at = emitted_at.lock()[0];
    assert!(at >= ms(60), "emitted {at:?} after start");
    assert!(at < ms(100), "emitted {at:?} after start");
    assert_eq!(observer.batches_emitted(), 1);
}

#[tokio::test(start_paused = true)]
async fn records_keep_arrival_order_within_a_batch() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::with_docs(vec![
        json!({"_id": "a"}),
        json!({"_id": "b"}),
        json!({"_id": "c"}),
    ]));
    let observer = observer_for(&query, &host, ObserverOptions::default());
    let (sink, log) = logging_sink();
    let _sub = observer.subscribe(sink);

    sleep(ms(60)).await;
    assert_eq!(log.lock().len(), 1, "initial replay flushed as one batch");

    query.update(&json!("b"), json!({"_id": "b", "done": true}));
    query.move_to(&json!("c"), 0);
    query.remove(&json!("a"));
    query.insert(json!({"_id": "d"}));
    sleep(ms(60)).await;

    assert_eq!(
        log.lock()[1],
        vec![
            ChangeRecord::update(1, json!({"_id": "b", "done": true})),
            ChangeRecord::moved(2, 0),
            ChangeRecord::remove(1),
            ChangeRecord::add(2, json!({"_id": "d"})),
        ]
    );
    assert_eq!(observer.last_batch().map(|b| b.len()), Some(4));
}

#[tokio::test(start_paused = true)]
async fn every_sink_receives_each_batch() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default());
    let (first, first_log) = logging_sink();
    let (second, second_log) = logging_sink();
    let _a = observer.subscribe(first);
    let _b = observer.subscribe(second);
    assert_eq!(observer.sink_count(), 2);

    query.insert(json!({"_id": 1}));
    sleep(ms(60)).await;

    assert_eq!(first_log.lock().len(), 1);
    assert_eq!(*first_log.lock(), *second_log.lock());
    assert_eq!(query.observe_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_debounce_batches_first_burst_then_emits_synchronously() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::with_docs(vec![
        json!({"_id": 1}),
        json!({"_id": 2}),
    ]));
    let observer = observer_for(&query, &host, ObserverOptions::default().debounce_ms(0));
    let (sink, log) = logging_sink();
    let _sub = observer.subscribe(sink);

    assert!(log.lock().is_empty(), "first burst waits for the loop to yield");
    sleep(ms(5)).await;
    assert_eq!(log.lock().len(), 1);
    assert_eq!(log.lock()[0].len(), 2);

    query.insert(json!({"_id": 3}));
    assert_eq!(log.lock().len(), 2, "steady state emits without yielding");
    query.insert(json!({"_id": 4}));
    assert_eq!(log.lock().len(), 3);
    assert_eq!(log.lock()[2], vec![ChangeRecord::add(3, json!({"_id": 4}))]);
}

// ============================================================================
// Modes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fetch_once_emits_single_snapshot_batch() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::with_docs(vec![
        json!({"_id": 1}),
        json!({"_id": 2}),
        json!({"_id": 3}),
    ]));
    let observer = observer_for(&query, &host, ObserverOptions::default().fetch_once());
    let (sink, log) = logging_sink();
    let _sub = observer.subscribe(sink);

    assert_eq!(
        *log.lock(),
        vec![vec![
            ChangeRecord::add(0, json!({"_id": 1})),
            ChangeRecord::add(1, json!({"_id": 2})),
            ChangeRecord::add(2, json!({"_id": 3})),
        ]]
    );
    assert_eq!(observer.phase(), ObserverPhase::FetchedOnce);

    query.insert(json!({"_id": 4}));
    query.remove(&json!(1));
    sleep(ms(200)).await;

    assert_eq!(log.lock().len(), 1);
    assert_eq!(query.observe_calls(), 0);
    assert_eq!(query.fetch_calls(), 1);
}

#[tokio::test]
async fn rejects_query_without_observe() {
    let host = Host::tokio();
    let query: SharedQuery = Arc::new(MemoryLiveQuery::new().with_capabilities(Capabilities {
        observe: false,
        observe_changes: true,
    }));

    let err = LiveQueryObserver::new(query, &host, ObserverOptions::default()).unwrap_err();
    assert!(matches!(err, LiveError::InvalidInput(_)));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn observation_starts_on_first_subscribe() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default());

    assert_eq!(observer.phase(), ObserverPhase::Idle);
    assert_eq!(query.active_observers(), 0);

    let (sink, _log) = logging_sink();
    let _sub = observer.subscribe(sink);
    let (again, _log2) = logging_sink();
    let _sub2 = observer.subscribe(again);

    assert_eq!(observer.phase(), ObserverPhase::Observing);
    assert_eq!(query.observe_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn destroy_drops_pending_batch_and_is_idempotent() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default());
    let (sink, log) = logging_sink();
    let _sub = observer.subscribe(sink);

    query.insert(json!({"_id": 1}));
    assert_eq!(observer.buffered(), 1);
    assert_eq!(host.root().pending_macro_tasks(), 1);

    observer.destroy();
    observer.destroy();
    sleep(ms(100)).await;

    assert!(log.lock().is_empty());
    assert_eq!(observer.phase(), ObserverPhase::Destroyed);
    assert_eq!(observer.buffered(), 0);
    assert_eq!(query.active_observers(), 0);
    assert_eq!(host.root().pending_macro_tasks(), 0);
}

#[tokio::test(start_paused = true)]
async fn subscribing_after_destroy_completes_immediately() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default());
    observer.destroy();

    let completes = Arc::new(AtomicUsize::new(0));
    let c = completes.clone();
    let sub = observer.subscribe(Subscriber::new(|_| {}).on_complete(move || {
        c.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(completes.load(Ordering::SeqCst), 1);
    assert!(sub.is_closed());
    assert_eq!(query.observe_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn query_error_reaches_each_sink_once() {
    let host = Host::tokio();
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let completes = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let (e, c) = (errors.clone(), completes.clone());
        let _ = observer.subscribe(
            Subscriber::new(|_| {})
                .on_error(move |err: &QueryError| e.lock().push(err.message.clone()))
                .on_complete(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
        );
    }

    query.insert(json!({"_id": 1}));
    query.fail(QueryError::new("subscription lost"));
    sleep(ms(100)).await;

    assert_eq!(
        *errors.lock(),
        vec!["subscription lost".to_string(), "subscription lost".to_string()]
    );
    assert_eq!(completes.load(Ordering::SeqCst), 0);
    assert_eq!(observer.phase(), ObserverPhase::Destroyed);
    assert_eq!(observer.batches_emitted(), 0);
    assert_eq!(observer.sink_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn pending_batch_keeps_context_unstable_until_flush() {
    let host = Host::tokio();
    let ctx = Context::new("list");
    let query = Arc::new(MemoryLiveQuery::new());
    let observer = observer_for(&query, &host, ObserverOptions::default().context(ctx.clone()));
    let stable = Arc::new(AtomicUsize::new(0));
    let s = stable.clone();
    ctx.on_stable(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });
    let (sink, log) = logging_sink();
    let _sub = observer.subscribe(sink);

    query.insert(json!({"_id": 1}));
    query.insert(json!({"_id": 2}));
    assert_eq!(ctx.pending_macro_tasks(), 1);
    assert!(!ctx.is_stable());

    sleep(ms(60)).await;

    assert_eq!(log.lock().len(), 1);
    assert!(ctx.is_stable());
    assert!(ctx.run_count() >= 1);
    assert!(stable.load(Ordering::SeqCst) >= 1);
    assert_eq!(observer.context(), &ctx);
}

#[tokio::test(start_paused = true)]
async fn observer_binds_to_context_current_at_construction() {
    let host = Host::tokio();
    let ctx = Context::new("panel");
    let query = Arc::new(MemoryLiveQuery::new());

    let observer = ctx.run(|| observer_for(&query, &host, ObserverOptions::default()));
    let fallback = observer_for(&query, &host, ObserverOptions::default());

    assert_eq!(observer.context(), &ctx);
    assert!(fallback.context().is_root());
    assert_eq!(query.len(), 0);
    assert!(query.fetch().is_empty());
}
