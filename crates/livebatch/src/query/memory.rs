//! MemoryLiveQuery: an in-memory, ordered live query over JSON documents.
//!
//! Documents are kept in insertion order and identified by `_id`. Every
//! mutation fires the registered callbacks synchronously, after the state
//! lock is released, so callbacks may read the query again.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::types::{track_id, Document, ID_FIELD};

use super::traits::{
    Capabilities, FnHandle, LiveQuery, LiveQueryHandle, ObserveCallbacks, ObserveChangesCallbacks,
};

/// In-memory ordered live query keyed by `_id`.
pub struct MemoryLiveQuery {
    state: Arc<Mutex<MemoryState>>,
    capabilities: Capabilities,
}

#[derive(Default)]
struct MemoryState {
    docs: Vec<Document>,
    observers: Vec<(u64, ObserveCallbacks)>,
    change_observers: Vec<(u64, ObserveChangesCallbacks)>,
    next_id: u64,
    observe_calls: usize,
    fetch_calls: usize,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn position(&self, id: &Value) -> Option<usize> {
        self.docs.iter().position(|d| track_id(d) == Some(id))
    }
}

/// Document fields without `_id`, as reported to `observe_changes`.
fn fields_of(doc: &Document) -> Document {
    match doc {
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != ID_FIELD)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(fields)
        }
        other => other.clone(),
    }
}

impl MemoryLiveQuery {
    /// Empty query.
    pub fn new() -> Self {
        Self::with_docs(Vec::new())
    }

    /// Query seeded with `docs` in order.
    pub fn with_docs(docs: Vec<Document>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                docs,
                ..MemoryState::default()
            })),
            capabilities: Capabilities::default(),
        }
    }

    /// Override the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Append `doc`; returns its index.
    pub fn insert(&self, doc: Document) -> usize {
        let len = self.state.lock().docs.len();
        self.insert_at(len, doc)
    }

    /// Insert `doc` at `index` (clamped to the end).
    pub fn insert_at(&self, index: usize, doc: Document) -> usize {
        let (index, observers, change_observers) = {
            let mut st = self.state.lock();
            let index = index.min(st.docs.len());
            st.docs.insert(index, doc.clone());
            (index, st.observers.clone(), st.change_observers.clone())
        };
        for (_, cbs) in &observers {
            if let Some(f) = &cbs.added_at {
                f(&doc, index);
            }
        }
        if let Some(id) = track_id(&doc) {
            let fields = fields_of(&doc);
            for (_, cbs) in &change_observers {
                if let Some(f) = &cbs.added {
                    f(id, &fields);
                }
            }
        }
        index
    }

    /// Replace the document with `_id == id`. Returns `false` if absent.
    pub fn update(&self, id: &Value, doc: Document) -> bool {
        let found = {
            let mut st = self.state.lock();
            st.position(id).map(|index| {
                let old = std::mem::replace(&mut st.docs[index], doc.clone());
                (index, old, st.observers.clone(), st.change_observers.clone())
            })
        };
        let Some((index, old, observers, change_observers)) = found else {
            return false;
        };
        for (_, cbs) in &observers {
            if let Some(f) = &cbs.changed_at {
                f(&doc, &old, index);
            }
        }
        let fields = fields_of(&doc);
        for (_, cbs) in &change_observers {
            if let Some(f) = &cbs.changed {
                f(id, &fields);
            }
        }
        true
    }

    /// Remove the document with `_id == id`. Returns `false` if absent.
    pub fn remove(&self, id: &Value) -> bool {
        let found = {
            let mut st = self.state.lock();
            st.position(id).map(|index| {
                let old = st.docs.remove(index);
                (index, old, st.observers.clone(), st.change_observers.clone())
            })
        };
        let Some((index, old, observers, change_observers)) = found else {
            return false;
        };
        for (_, cbs) in &observers {
            if let Some(f) = &cbs.removed_at {
                f(&old, index);
            }
        }
        for (_, cbs) in &change_observers {
            if let Some(f) = &cbs.removed {
                f(id);
            }
        }
        true
    }

    /// Move the document with `_id == id` to position `to` (clamped).
    pub fn move_to(&self, id: &Value, to: usize) -> bool {
        let found = {
            let mut st = self.state.lock();
            st.position(id).map(|from| {
                let doc = st.docs.remove(from);
                let to = to.min(st.docs.len());
                st.docs.insert(to, doc.clone());
                (from, to, doc, st.observers.clone())
            })
        };
        let Some((from, to, doc, observers)) = found else {
            return false;
        };
        if from != to {
            for (_, cbs) in &observers {
                if let Some(f) = &cbs.moved_to {
                    f(&doc, from, to);
                }
            }
        }
        true
    }

    /// Report `err` to every observer and drop all observations.
    pub fn fail(&self, err: QueryError) {
        let (observers, change_observers) = {
            let mut st = self.state.lock();
            (
                std::mem::take(&mut st.observers),
                std::mem::take(&mut st.change_observers),
            )
        };
        for (_, cbs) in &observers {
            if let Some(f) = &cbs.error {
                f(&err);
            }
        }
        for (_, cbs) in &change_observers {
            if let Some(f) = &cbs.error {
                f(&err);
            }
        }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.state.lock().docs.len()
    }

    /// Whether the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().docs.is_empty()
    }

    /// Live `observe` + `observe_changes` registrations.
    pub fn active_observers(&self) -> usize {
        let st = self.state.lock();
        st.observers.len() + st.change_observers.len()
    }

    /// Total `observe` calls over the query's lifetime.
    pub fn observe_calls(&self) -> usize {
        self.state.lock().observe_calls
    }

    /// How many times `fetch` was called.
    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }
}

impl Default for MemoryLiveQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveQuery for MemoryLiveQuery {
    fn fetch(&self) -> Vec<Document> {
        let mut st = self.state.lock();
        st.fetch_calls += 1;
        st.docs.clone()
    }

    fn observe(&self, callbacks: ObserveCallbacks) -> LiveQueryHandle {
        let (id, initial) = {
            let mut st = self.state.lock();
            st.observe_calls += 1;
            let id = st.next_id();
            st.observers.push((id, callbacks.clone()));
            (id, st.docs.clone())
        };
        if let Some(f) = &callbacks.added_at {
            for (index, doc) in initial.iter().enumerate() {
                f(doc, index);
            }
        }
        let state = Arc::clone(&self.state);
        FnHandle::boxed(move || state.lock().observers.retain(|(oid, _)| *oid != id))
    }

    fn observe_changes(&self, callbacks: ObserveChangesCallbacks) -> LiveQueryHandle {
        let (id, initial) = {
            let mut st = self.state.lock();
            let id = st.next_id();
            st.change_observers.push((id, callbacks.clone()));
            (id, st.docs.clone())
        };
        if let Some(f) = &callbacks.added {
            for doc in &initial {
                if let Some(doc_id) = track_id(doc) {
                    f(doc_id, &fields_of(doc));
                }
            }
        }
        let state = Arc::clone(&self.state);
        FnHandle::boxed(move || {
            state
                .lock()
                .change_observers
                .retain(|(oid, _)| *oid != id)
        })
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}
