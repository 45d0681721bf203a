//! Binding request callbacks to a context through the flush scheduler.

use std::sync::Arc;
use std::time::Duration;

use livebatch::error::CallError;
use livebatch::runtime::{Context, Host};
use livebatch::schedule::{Callback, Handlers};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn bound_result_fn_runs_in_root_then_resumes_owner() {
    let host = Host::tokio();
    let ctx = Context::new("form");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    let bound = host.scheduler().bind(
        &ctx,
        Callback::from_fn(move |err, result| {
            let in_root = Context::current().map(|c| c.is_root());
            s.lock()
                .push((err.is_some(), result.cloned(), in_root));
        }),
    );

    bound.ready(Some(&json!({"ok": true})));

    assert_eq!(
        *seen.lock(),
        vec![(false, Some(json!({"ok": true})), Some(true))]
    );
    assert!(host.scheduler().is_pending(&ctx));
    assert_eq!(ctx.run_count(), 0);

    sleep(Duration::from_millis(5)).await;
    assert_eq!(ctx.run_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn bound_handlers_coalesce_into_one_resumption() {
    let host = Host::tokio();
    let ctx = Context::new("list");
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let (r, e, s) = (log.clone(), log.clone(), log.clone());
    let bound = host.scheduler().bind(
        &ctx,
        Callback::Handlers(
            Handlers::default()
                .on_ready(move |v: Option<&Value>| r.lock().push(format!("ready {v:?}")))
                .on_error(move |err: &CallError| e.lock().push(err.to_string()))
                .on_stop(move |_| s.lock().push("stop".to_string())),
        ),
    );

    bound.ready(None);
    bound.error(&CallError::new("lists.insert", "denied"));
    bound.stop(None);

    assert_eq!(
        *log.lock(),
        vec![
            "ready None".to_string(),
            "Call \"lists.insert\" failed: denied".to_string(),
            "stop".to_string(),
        ]
    );

    sleep(Duration::from_millis(5)).await;
    assert_eq!(ctx.run_count(), 1);
    assert_eq!(host.scheduler().resumptions(), 1);
}

#[test]
fn result_fn_sees_stop_as_call_without_result() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();
    let cb = Callback::from_fn(move |err, result| {
        c.lock().push((err.map(|e| e.to_string()), result.cloned()))
    });

    cb.stop(Some(&CallError::new("sub", "gone")));
    cb.ready(Some(&json!(3)));

    assert_eq!(
        *calls.lock(),
        vec![
            (Some("Call \"sub\" failed: gone".to_string()), None),
            (None, Some(json!(3))),
        ]
    );
}
