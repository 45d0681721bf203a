//! ReadyTracker tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use livebatch::error::CallError;
use livebatch::schedule::{Callback, Handlers, ReadyTracker};
use serde_json::json;

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    (hits, move || {
        let h = h.clone();
        Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    })
}

#[test]
fn on_ready_fires_immediately_when_nothing_pending() {
    let tracker = ReadyTracker::new();
    let (hits, make) = counter();

    tracker.on_ready(make());

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn on_ready_waits_for_every_pending_request() {
    let tracker = ReadyTracker::new();
    let (hits, make) = counter();

    let first = tracker.push(Callback::noop());
    let second = tracker.push(Callback::noop());
    assert_eq!(tracker.pending(), 2);

    tracker.on_ready(make());
    first.ready(None);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    second.error(&CallError::new("m", "boom"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.pending(), 0);
}

#[test]
fn only_first_delivery_resolves() {
    let tracker = ReadyTracker::new();
    let (hits, make) = counter();

    let a = tracker.push(Callback::noop());
    let b = tracker.push(Callback::noop());
    tracker.on_ready(make());

    a.ready(None);
    a.ready(None);
    a.stop(None);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(tracker.pending(), 1);

    b.ready(Some(&json!(1)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn later_requests_do_not_delay_earlier_waiters() {
    let tracker = ReadyTracker::new();
    let (hits, make) = counter();

    let a = tracker.push(Callback::noop());
    tracker.on_ready(make());
    let _b = tracker.push(Callback::noop());

    a.ready(None);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.pending(), 1);
}

#[test]
fn wrapped_handlers_still_deliver() {
    let tracker = ReadyTracker::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let d = delivered.clone();

    let cb = tracker.push(Callback::Handlers(Handlers::default().on_ready(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    })));
    cb.ready(None);

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.pending(), 0);
}

#[test]
fn partial_handlers_resolve_on_any_delivery() {
    let tracker = ReadyTracker::new();
    let (hits, make) = counter();
    let errors = Arc::new(AtomicUsize::new(0));
    let e = errors.clone();

    let error_only = tracker.push(Callback::Handlers(Handlers::default().on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    })));
    let ready_only = tracker.push(Callback::Handlers(Handlers::default().on_ready(|_| {})));
    tracker.on_ready(make());

    error_only.ready(None);
    assert_eq!(tracker.pending(), 1);
    ready_only.stop(None);

    assert_eq!(tracker.pending(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}
