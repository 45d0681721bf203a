//! Request/response callbacks and binding them to an execution context.
//!
//! A [`Callback`] is either a single result function or a set of named
//! handlers. The variant is decided once, when the callback is built; the
//! wrappers below transform every present slot without inspecting it again.

use std::sync::Arc;

use serde_json::Value;

use crate::error::CallError;
use crate::runtime::context::Context;

use super::flush::FlushScheduler;

pub type ResultFn = Arc<dyn Fn(Option<&CallError>, Option<&Value>) + Send + Sync>;
pub type ReadyFn = Arc<dyn Fn(Option<&Value>) + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&CallError) + Send + Sync>;
pub type StopFn = Arc<dyn Fn(Option<&CallError>) + Send + Sync>;

/// Wraps one delivery; receives the inner delivery as a closure.
pub type Around = Arc<dyn Fn(&mut dyn FnMut()) + Send + Sync>;

/// Named handlers for the outcomes of a request.
#[derive(Clone, Default)]
pub struct Handlers {
    pub on_ready: Option<ReadyFn>,
    pub on_error: Option<ErrorFn>,
    pub on_stop: Option<StopFn>,
}

impl Handlers {
    pub fn on_ready(mut self, f: impl Fn(Option<&Value>) + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&CallError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_stop(mut self, f: impl Fn(Option<&CallError>) + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(f));
        self
    }

    /// Fill every empty slot with a no-op so each delivery kind has a
    /// handler to wrap.
    pub(crate) fn with_all_slots(self) -> Self {
        Self {
            on_ready: self
                .on_ready
                .or_else(|| Some(Arc::new(|_: Option<&Value>| {}) as ReadyFn)),
            on_error: self
                .on_error
                .or_else(|| Some(Arc::new(|_: &CallError| {}) as ErrorFn)),
            on_stop: self
                .on_stop
                .or_else(|| Some(Arc::new(|_: Option<&CallError>| {}) as StopFn)),
        }
    }
}

/// Completion callback for a request.
#[derive(Clone)]
pub enum Callback {
    Fn(ResultFn),
    Handlers(Handlers),
}

impl Callback {
    /// Callback from a single result function.
    pub fn from_fn(f: impl Fn(Option<&CallError>, Option<&Value>) + Send + Sync + 'static) -> Self {
        Self::Fn(Arc::new(f))
    }

    /// Callback that ignores every delivery.
    pub fn noop() -> Self {
        Self::from_fn(|_, _| {})
    }

    /// Deliver a successful result.
    pub fn ready(&self, result: Option<&Value>) {
        match self {
            Self::Fn(f) => f(None, result),
            Self::Handlers(h) => {
                if let Some(f) = &h.on_ready {
                    f(result);
                }
            }
        }
    }

    /// Deliver a failure.
    pub fn error(&self, err: &CallError) {
        match self {
            Self::Fn(f) => f(Some(err), None),
            Self::Handlers(h) => {
                if let Some(f) = &h.on_error {
                    f(err);
                }
            }
        }
    }

    /// Deliver a stop notification. Result functions see it as a call
    /// without a result.
    pub fn stop(&self, err: Option<&CallError>) {
        match self {
            Self::Fn(f) => f(err, None),
            Self::Handlers(h) => {
                if let Some(f) = &h.on_stop {
                    f(err);
                }
            }
        }
    }

    /// Route every delivery through `around`.
    pub fn wrap(self, around: Around) -> Self {
        match self {
            Self::Fn(f) => Self::Fn(Arc::new(
                move |err: Option<&CallError>, result: Option<&Value>| {
                    around(&mut || f(err, result));
                },
            )),
            Self::Handlers(h) => Self::Handlers(Handlers {
                on_ready: h.on_ready.map(|f| {
                    let around = Arc::clone(&around);
                    Arc::new(move |result: Option<&Value>| around(&mut || f(result))) as ReadyFn
                }),
                on_error: h.on_error.map(|f| {
                    let around = Arc::clone(&around);
                    Arc::new(move |err: &CallError| around(&mut || f(err))) as ErrorFn
                }),
                on_stop: h.on_stop.map(|f| {
                    let around = Arc::clone(&around);
                    Arc::new(move |err: Option<&CallError>| around(&mut || f(err))) as StopFn
                }),
            }),
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fn(_) => f.write_str("Callback::Fn"),
            Self::Handlers(h) => f
                .debug_struct("Callback::Handlers")
                .field("on_ready", &h.on_ready.is_some())
                .field("on_error", &h.on_error.is_some())
                .field("on_stop", &h.on_stop.is_some())
                .finish(),
        }
    }
}

impl FlushScheduler {
    /// Bind `callback` to `context`: each delivery runs in the root context
    /// and then requests a resumption of `context`.
    pub fn bind(self: &Arc<Self>, context: &Context, callback: Callback) -> Callback {
        let scheduler = Arc::clone(self);
        let context = context.clone();
        callback.wrap(Arc::new(move |deliver: &mut dyn FnMut()| {
            scheduler.run_bound(&context, deliver);
        }))
    }
}
