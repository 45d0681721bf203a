//! MulticastCursor: one live query shared by many subscribers.
//!
//! The underlying [`LiveQueryObserver`] is created lazily when the first
//! sink subscribes and torn down when the last one leaves. A later
//! subscription starts a fresh segment with a new observer. An explicit
//! [`MulticastCursor::stop`] (or a query error) is terminal.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ObserverOptions;
use crate::error::{LiveError, QueryError, Result};
use crate::query::handle::ResourceHandle;
use crate::query::traits::{is_observable, FnHandle, SharedQuery};
use crate::runtime::host::Host;
use crate::types::{Batch, Document};

use super::observer::LiveQueryObserver;
use super::subscriber::{Subscriber, Subscription};

#[derive(Clone)]
pub struct MulticastCursor {
    inner: Arc<MulticastInner>,
}

struct MulticastInner {
    query: SharedQuery,
    host: Host,
    options: ObserverOptions,
    state: Mutex<MulticastState>,
}

#[derive(Default)]
struct MulticastState {
    /// Registered sinks keyed by registration order.
    sinks: BTreeMap<u64, Subscriber>,
    next_id: u64,
    /// Set while a segment is running or being started.
    live: bool,
    segment: Option<Segment>,
    stopped: bool,
    segments_started: u64,
}

struct Segment {
    observer: LiveQueryObserver,
    handle: ResourceHandle,
}

impl MulticastCursor {
    /// Wrap `query`; fails with `InvalidInput` if it cannot be observed.
    pub fn new(query: SharedQuery, host: &Host, options: ObserverOptions) -> Result<Self> {
        if !is_observable(query.as_ref()) {
            return Err(LiveError::InvalidInput(
                "live query does not support observe".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(MulticastInner {
                query,
                host: host.clone(),
                options,
                state: Mutex::new(MulticastState::default()),
            }),
        })
    }

    /// Register `sink`, starting the underlying observation if it is the
    /// first active one. Sinks registered after `stop()` complete at once.
    pub fn subscribe(&self, sink: Subscriber) -> Subscription {
        let (id, start) = {
            let mut st = self.inner.state.lock();
            if st.stopped {
                drop(st);
                sink.complete();
                return Subscription::closed();
            }
            st.next_id += 1;
            let id = st.next_id;
            st.sinks.insert(id, sink);
            let start = !st.live;
            st.live = true;
            (id, start)
        };

        if start {
            if let Err(err) = self.inner.start_segment() {
                warn!(error = %err, "failed to start live query observation");
                let waiting = {
                    let mut st = self.inner.state.lock();
                    st.live = false;
                    std::mem::take(&mut st.sinks)
                };
                let failure = QueryError::new(err.to_string());
                for waiting_sink in waiting.into_values() {
                    waiting_sink.error(&failure);
                }
                return Subscription::closed();
            }
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.release(id);
            }
        })
    }

    /// Release the observation and complete every registered sink. The
    /// cursor cannot be reused afterwards. Idempotent.
    pub fn stop(&self) {
        self.inner.terminate(None);
    }

    /// Snapshot of the live query; needs no active subscription.
    pub fn fetch(&self) -> Vec<Document> {
        self.inner.query.fetch()
    }

    pub fn query(&self) -> &SharedQuery {
        &self.inner.query
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.inner.state.lock().sinks.len()
    }

    /// Whether an underlying observation is running.
    pub fn is_live(&self) -> bool {
        self.inner.state.lock().live
    }

    /// Whether `stop()` ran or the query failed.
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Number of observation segments started over the cursor's lifetime.
    pub fn segments_started(&self) -> u64 {
        self.inner.state.lock().segments_started
    }

    /// Observer of the running segment.
    pub fn observer(&self) -> Option<LiveQueryObserver> {
        self.inner
            .state
            .lock()
            .segment
            .as_ref()
            .map(|s| s.observer.clone())
    }
}

impl MulticastInner {
    fn start_segment(self: &Arc<Self>) -> Result<()> {
        let observer =
            LiveQueryObserver::new(Arc::clone(&self.query), &self.host, self.options.clone())?;

        let on_next = Arc::downgrade(self);
        let on_error = Arc::downgrade(self);
        let forward = Subscriber::new(move |batch| {
            if let Some(inner) = on_next.upgrade() {
                inner.broadcast(batch);
            }
        })
        .on_error(move |err| {
            if let Some(inner) = on_error.upgrade() {
                inner.terminate(Some(err.clone()));
            }
        });

        let segment_no = {
            let mut st = self.state.lock();
            st.segments_started += 1;
            st.segments_started
        };
        debug!(segment = segment_no, "starting multicast segment");

        let subscription = observer.subscribe(forward);
        let handle = {
            let observer = observer.clone();
            ResourceHandle::new(
                FnHandle::boxed(move || {
                    subscription.unsubscribe();
                    observer.destroy();
                }),
                None,
            )
        };

        let orphaned = {
            let mut st = self.state.lock();
            if st.live && !st.stopped && st.segment.is_none() && !st.sinks.is_empty() {
                st.segment = Some(Segment { observer, handle });
                None
            } else {
                Some(handle)
            }
        };
        // Every sink left, or the cursor stopped, while the segment was
        // starting.
        if let Some(handle) = orphaned {
            handle.stop();
        }
        Ok(())
    }

    fn broadcast(&self, batch: &Batch) {
        let sinks: Vec<Subscriber> = self.state.lock().sinks.values().cloned().collect();
        for sink in sinks {
            sink.next(batch);
        }
    }

    fn release(&self, id: u64) {
        let segment = {
            let mut st = self.state.lock();
            if st.sinks.remove(&id).is_none() || !st.sinks.is_empty() || !st.live {
                return;
            }
            st.live = false;
            st.segment.take()
        };
        debug!("last subscriber left, stopping multicast segment");
        if let Some(segment) = segment {
            segment.handle.stop();
        }
    }

    /// Terminal stop. `Some(err)` errors every sink instead of completing it.
    fn terminate(&self, err: Option<QueryError>) {
        let (segment, sinks) = {
            let mut st = self.state.lock();
            if st.stopped {
                return;
            }
            st.stopped = true;
            st.live = false;
            (st.segment.take(), std::mem::take(&mut st.sinks))
        };
        debug!(sinks = sinks.len(), error = err.is_some(), "stopping multicast cursor");
        if let Some(segment) = segment {
            segment.handle.stop();
        }
        for sink in sinks.into_values() {
            match &err {
                Some(err) => sink.error(err),
                None => sink.complete(),
            }
        }
    }
}

impl std::fmt::Debug for MulticastCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("MulticastCursor")
            .field("sinks", &st.sinks.len())
            .field("live", &st.live)
            .field("stopped", &st.stopped)
            .finish()
    }
}
