//! ResourceHandle release semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use livebatch::query::{
    FnHandle, LiveQuery, MemoryLiveQuery, ObserveCallbacks, ResourceHandle, Stoppable,
};
use parking_lot::Mutex;
use serde_json::json;

struct CountingHandle {
    name: &'static str,
    stops: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Stoppable for CountingHandle {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(self.name);
    }
}

#[test]
fn stop_twice_releases_each_handle_once() {
    let stops = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let observer = CountingHandle {
        name: "observer",
        stops: stops.clone(),
        log: log.clone(),
    };
    let auto_notify = CountingHandle {
        name: "auto_notify",
        stops: stops.clone(),
        log: log.clone(),
    };
    let handle = ResourceHandle::new(Box::new(observer), Some(Box::new(auto_notify)));

    handle.stop();
    handle.stop();

    assert_eq!(stops.load(Ordering::SeqCst), 2);
    assert_eq!(*log.lock(), vec!["auto_notify", "observer"]);
    assert!(handle.is_stopped());
}

#[test]
fn stop_without_auto_notify_releases_observer() {
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();
    let handle = ResourceHandle::new(
        FnHandle::boxed(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }),
        None,
    );

    handle.stop();
    handle.stop();

    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn stopping_wrapped_observation_detaches_callbacks() {
    let query = MemoryLiveQuery::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    let handle = ResourceHandle::new(
        query.observe(ObserveCallbacks::default().added_at(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        })),
        None,
    );

    query.insert(json!({"_id": 1}));
    handle.stop();
    query.insert(json!({"_id": 2}));

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(query.active_observers(), 0);
}
