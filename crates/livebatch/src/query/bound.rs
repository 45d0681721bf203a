//! ContextBoundQuery: routes a live query's callbacks through the flush
//! scheduler.
//!
//! Callbacks registered through this wrapper execute in the root context and
//! then request a resumption of the context that was current when `observe`
//! (or `observe_changes`) was called. Many bound observations firing in one
//! burst therefore resume each owning context once.

use std::sync::Arc;

use crate::error::QueryError;
use crate::runtime::context::Context;
use crate::schedule::flush::FlushScheduler;
use crate::types::Document;

use super::traits::{
    AddedAtFn, AddedFn, Capabilities, ChangedAtFn, ChangedFn, LiveQuery, LiveQueryHandle,
    MovedToFn, ObserveCallbacks, ObserveChangesCallbacks, QueryErrorFn, RemovedAtFn, RemovedFn,
    SharedQuery,
};

/// Live query whose callbacks run in the root context and resume the caller's context.
pub struct ContextBoundQuery {
    inner: SharedQuery,
    scheduler: Arc<FlushScheduler>,
}

impl ContextBoundQuery {
    /// Bind `inner`'s callbacks through `scheduler`.
    pub fn new(inner: SharedQuery, scheduler: Arc<FlushScheduler>) -> Self {
        Self { inner, scheduler }
    }

    /// The wrapped query.
    pub fn inner(&self) -> &SharedQuery {
        &self.inner
    }

    fn owner(&self) -> Context {
        Context::current().unwrap_or_else(|| self.scheduler.root().clone())
    }
}

impl LiveQuery for ContextBoundQuery {
    fn fetch(&self) -> Vec<Document> {
        self.inner.fetch()
    }

    fn observe(&self, callbacks: ObserveCallbacks) -> LiveQueryHandle {
        let owner = self.owner();
        let s = &self.scheduler;
        let bound = ObserveCallbacks {
            added_at: callbacks.added_at.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |doc: &Document, i: usize| s.run_bound(&ctx, || f(doc, i))) as AddedAtFn
            }),
            changed_at: callbacks.changed_at.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |new: &Document, old: &Document, i: usize| {
                    s.run_bound(&ctx, || f(new, old, i))
                }) as ChangedAtFn
            }),
            moved_to: callbacks.moved_to.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |doc: &Document, from: usize, to: usize| {
                    s.run_bound(&ctx, || f(doc, from, to))
                }) as MovedToFn
            }),
            removed_at: callbacks.removed_at.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |doc: &Document, i: usize| s.run_bound(&ctx, || f(doc, i))) as RemovedAtFn
            }),
            error: callbacks.error.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |err: &QueryError| s.run_bound(&ctx, || f(err))) as QueryErrorFn
            }),
        };
        self.inner.observe(bound)
    }

    fn observe_changes(&self, callbacks: ObserveChangesCallbacks) -> LiveQueryHandle {
        let owner = self.owner();
        let s = &self.scheduler;
        let bound = ObserveChangesCallbacks {
            added: callbacks.added.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |id: &serde_json::Value, fields: &Document| {
                    s.run_bound(&ctx, || f(id, fields))
                }) as AddedFn
            }),
            changed: callbacks.changed.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |id: &serde_json::Value, fields: &Document| {
                    s.run_bound(&ctx, || f(id, fields))
                }) as ChangedFn
            }),
            removed: callbacks.removed.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |id: &serde_json::Value| s.run_bound(&ctx, || f(id))) as RemovedFn
            }),
            error: callbacks.error.map(|f| {
                let (s, ctx) = (Arc::clone(s), owner.clone());
                Arc::new(move |err: &QueryError| s.run_bound(&ctx, || f(err))) as QueryErrorFn
            }),
        };
        self.inner.observe_changes(bound)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
}
