//! Host: the per-process bundle of root context, timers and flush scheduler.
//!
//! One host is constructed at startup and cloned into every observer,
//! multicast cursor and differ that needs it.

use std::sync::Arc;

use crate::schedule::flush::FlushScheduler;

use super::context::Context;
use super::timer::{TimerHost, TokioTimers};

#[derive(Clone)]
pub struct Host {
    root: Context,
    timers: Arc<dyn TimerHost>,
    scheduler: Arc<FlushScheduler>,
}

impl Host {
    /// Build a host around `timers`, with a fresh root context and scheduler.
    pub fn new(timers: Arc<dyn TimerHost>) -> Self {
        let root = Context::root();
        let scheduler = Arc::new(FlushScheduler::new(root.clone(), Arc::clone(&timers)));
        Self {
            root,
            timers,
            scheduler,
        }
    }

    /// A host driven by the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn tokio() -> Self {
        Self::new(Arc::new(TokioTimers::current()))
    }

    /// The root context; deliveries from live queries run here.
    pub fn root(&self) -> &Context {
        &self.root
    }

    /// Timer host used by debouncers and the scheduler.
    pub fn timers(&self) -> &Arc<dyn TimerHost> {
        &self.timers
    }

    /// Shared flush scheduler for this host.
    pub fn scheduler(&self) -> &Arc<FlushScheduler> {
        &self.scheduler
    }

    /// The context current on this thread, falling back to the root.
    pub fn current_context(&self) -> Context {
        Context::current().unwrap_or_else(|| self.root.clone())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("root", &self.root).finish()
    }
}
