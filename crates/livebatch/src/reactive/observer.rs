//! LiveQueryObserver: turns per-document callbacks into debounced batches.
//!
//! # Lifecycle
//!
//! `Idle -> Observing -> Destroyed`, or `Idle -> FetchedOnce -> Destroyed`
//! in fetch-once mode. Observation starts lazily on the first `subscribe`
//! and a destroyed observer never observes again.
//!
//! # Flushing
//!
//! Each callback appends one [`ChangeRecord`] to the in-flight buffer and
//! triggers the debouncer. Opening a debounce window schedules an `emit`
//! macrotask on the observer's context, so the context stays unstable while
//! a batch is pending. When the window closes the task is invoked (the
//! buffer is emitted as one [`Batch`] and cleared) and the context is run
//! once.
//!
//! With a zero debounce the first burst, including the documents replayed
//! by `observe` itself, still coalesces into one batch. After that first
//! flush every record is emitted on its own, synchronously.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::{ObserveMode, ObserverOptions};
use crate::error::{LiveError, QueryError, Result};
use crate::query::handle::ResourceHandle;
use crate::query::traits::{is_observable, ObserveCallbacks, SharedQuery};
use crate::runtime::context::Context;
use crate::runtime::emitter::Emitter;
use crate::runtime::host::Host;
use crate::runtime::macrotask::{MacroTask, MacroTaskOptions};
use crate::schedule::debounce::{debounce, Debouncer};
use crate::types::{Batch, ChangeRecord};

use super::subscriber::{Subscriber, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    Idle,
    Observing,
    FetchedOnce,
    Destroyed,
}

/// What the observer delivers to its sinks.
#[derive(Debug, Clone)]
enum Signal {
    Next(Batch),
    Error(QueryError),
}

#[derive(Clone)]
pub struct LiveQueryObserver {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    query: SharedQuery,
    host: Host,
    context: Context,
    mode: ObserveMode,
    debouncer: Debouncer<Option<MacroTask>>,
    signals: Arc<Emitter<Signal>>,
    state: Mutex<ObserverState>,
}

struct ObserverState {
    phase: ObserverPhase,
    buffer: Vec<ChangeRecord>,
    handle: Option<ResourceHandle>,
    flushed_once: bool,
    last_batch: Option<Batch>,
    batches: u64,
}

impl LiveQueryObserver {
    /// Bind `query`. Fails with [`LiveError::InvalidInput`] if the query
    /// cannot be observed.
    pub fn new(query: SharedQuery, host: &Host, options: ObserverOptions) -> Result<Self> {
        if !is_observable(query.as_ref()) {
            return Err(LiveError::InvalidInput(
                "live query does not support observe".to_string(),
            ));
        }
        let context = options
            .context
            .clone()
            .unwrap_or_else(|| host.current_context());

        let inner = Arc::new_cyclic(|weak: &Weak<ObserverInner>| {
            let on_flush = weak.clone();
            let on_open = weak.clone();
            let debouncer = debounce(
                Arc::clone(host.timers()),
                options.debounce,
                move |task: Option<MacroTask>| {
                    if let (Some(inner), Some(task)) = (on_flush.upgrade(), task) {
                        inner.run_task(task);
                    }
                },
                move || on_open.upgrade().map(|inner| inner.schedule_emit()),
            );
            ObserverInner {
                query,
                host: host.clone(),
                context,
                mode: options.mode,
                debouncer,
                signals: Arc::new(Emitter::new()),
                state: Mutex::new(ObserverState {
                    phase: ObserverPhase::Idle,
                    buffer: Vec::new(),
                    handle: None,
                    flushed_once: false,
                    last_batch: None,
                    batches: 0,
                }),
            }
        });
        Ok(Self { inner })
    }

    /// Register `sink`; the first registration starts observation.
    pub fn subscribe(&self, sink: Subscriber) -> Subscription {
        let phase = self.phase();
        if phase == ObserverPhase::Destroyed {
            sink.complete();
            return Subscription::closed();
        }

        let listener = self.inner.signals.on(move |signal| match signal {
            Signal::Next(batch) => sink.next(batch),
            Signal::Error(err) => sink.error(err),
        });
        let signals = Arc::clone(&self.inner.signals);
        let subscription = Subscription::new(move || {
            signals.off(listener);
        });

        let start = {
            let mut st = self.inner.state.lock();
            if st.phase == ObserverPhase::Idle {
                st.phase = match self.inner.mode {
                    ObserveMode::Live => ObserverPhase::Observing,
                    ObserveMode::FetchOnce => ObserverPhase::FetchedOnce,
                };
                true
            } else {
                false
            }
        };
        if start {
            match self.inner.mode {
                ObserveMode::Live => self.inner.start_observing(),
                ObserveMode::FetchOnce => self.inner.fetch_once(),
            }
        }
        subscription
    }

    /// Stop the underlying observation. Idempotent.
    pub fn destroy(&self) {
        self.inner.shut_down();
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ObserverPhase {
        self.inner.state.lock().phase
    }

    /// Context that batches are flushed in.
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn query(&self) -> &SharedQuery {
        &self.inner.query
    }

    /// The most recently emitted batch.
    pub fn last_batch(&self) -> Option<Batch> {
        self.inner.state.lock().last_batch.clone()
    }

    /// Number of batches emitted so far.
    pub fn batches_emitted(&self) -> u64 {
        self.inner.state.lock().batches
    }

    /// Records buffered but not yet flushed.
    pub fn buffered(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    /// Number of attached sinks.
    pub fn sink_count(&self) -> usize {
        self.inner.signals.len()
    }
}

impl ObserverInner {
    fn start_observing(self: &Arc<Self>) {
        debug!(context = self.context.name(), "starting live query observation");
        let callbacks = self.callbacks();
        let query = Arc::clone(&self.query);
        let handle = self.host.root().run(|| query.observe(callbacks));

        let stale = {
            let mut st = self.state.lock();
            if st.phase == ObserverPhase::Observing {
                st.handle = Some(ResourceHandle::new(handle, None));
                None
            } else {
                Some(handle)
            }
        };
        if let Some(handle) = stale {
            handle.stop();
        }
    }

    fn fetch_once(&self) {
        let records: Vec<ChangeRecord> = self
            .query
            .fetch()
            .into_iter()
            .enumerate()
            .map(|(index, doc)| ChangeRecord::add(index, doc))
            .collect();
        debug!(records = records.len(), "emitting fetched snapshot");
        self.emit(Batch::new(records));
    }

    fn callbacks(self: &Arc<Self>) -> ObserveCallbacks {
        let (a, c, m, r, e) = (
            Arc::downgrade(self),
            Arc::downgrade(self),
            Arc::downgrade(self),
            Arc::downgrade(self),
            Arc::downgrade(self),
        );
        ObserveCallbacks::default()
            .added_at(move |doc, index| {
                if let Some(inner) = a.upgrade() {
                    inner.record(ChangeRecord::add(index, doc.clone()));
                }
            })
            .changed_at(move |new_doc, _old_doc, index| {
                if let Some(inner) = c.upgrade() {
                    inner.record(ChangeRecord::update(index, new_doc.clone()));
                }
            })
            .moved_to(move |_doc, from_index, to_index| {
                if let Some(inner) = m.upgrade() {
                    inner.record(ChangeRecord::moved(from_index, to_index));
                }
            })
            .removed_at(move |_doc, index| {
                if let Some(inner) = r.upgrade() {
                    inner.record(ChangeRecord::remove(index));
                }
            })
            .error(move |err| {
                if let Some(inner) = e.upgrade() {
                    inner.fail(err.clone());
                }
            })
    }

    fn record(self: &Arc<Self>, change: ChangeRecord) {
        let flushed_once = {
            let mut st = self.state.lock();
            if st.phase != ObserverPhase::Observing {
                return;
            }
            st.buffer.push(change);
            st.flushed_once
        };
        if self.debouncer.wait().is_zero() && flushed_once {
            let task = self.schedule_emit();
            self.run_task(task);
        } else {
            self.debouncer.trigger();
        }
    }

    /// Mark the context busy until the pending batch is emitted.
    fn schedule_emit(self: &Arc<Self>) -> MacroTask {
        let weak = Arc::downgrade(self);
        self.context.schedule_macro_task(
            "emit",
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush();
                }
            },
            MacroTaskOptions::once(),
            |_| None,
        )
    }

    fn run_task(&self, task: MacroTask) {
        task.invoke();
        self.context.run(|| {});
        self.state.lock().flushed_once = true;
    }

    fn flush(&self) {
        let records = {
            let mut st = self.state.lock();
            if st.phase != ObserverPhase::Observing || st.buffer.is_empty() {
                return;
            }
            std::mem::take(&mut st.buffer)
        };
        trace!(records = records.len(), "flushing batch");
        self.emit(Batch::new(records));
    }

    fn emit(&self, batch: Batch) {
        {
            let mut st = self.state.lock();
            st.batches += 1;
            st.last_batch = Some(batch.clone());
        }
        self.signals.emit(&Signal::Next(batch));
    }

    fn fail(&self, err: QueryError) {
        debug!(error = %err, "live query reported an error");
        if !self.shut_down() {
            return;
        }
        self.signals.emit(&Signal::Error(err));
        self.signals.clear();
    }

    /// Transition to `Destroyed`. Returns `false` if already destroyed.
    fn shut_down(&self) -> bool {
        let handle = {
            let mut st = self.state.lock();
            if st.phase == ObserverPhase::Destroyed {
                return false;
            }
            st.phase = ObserverPhase::Destroyed;
            st.buffer.clear();
            st.handle.take()
        };
        debug!(context = self.context.name(), "destroying live query observer");
        if let Some(Some(task)) = self.debouncer.cancel() {
            task.cancel();
        }
        if let Some(handle) = handle {
            handle.stop();
        }
        true
    }
}

impl std::fmt::Debug for LiveQueryObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQueryObserver")
            .field("phase", &self.phase())
            .field("context", &self.inner.context)
            .field("mode", &self.inner.mode)
            .finish()
    }
}
