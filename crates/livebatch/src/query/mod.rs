//! Live-query capability and the adapters built directly on it.
//!
//! # Modules
//!
//! - [`traits`]: [`LiveQuery`], callback sets, [`Stoppable`] handles.
//! - [`handle`]: [`ResourceHandle`] joint release.
//! - [`memory`]: [`MemoryLiveQuery`] in-memory implementation.
//! - [`bound`]: [`ContextBoundQuery`] scheduler-routed wrapper.

pub mod bound;
pub mod handle;
pub mod memory;
pub mod traits;

pub use bound::ContextBoundQuery;
pub use handle::ResourceHandle;
pub use memory::MemoryLiveQuery;
pub use traits::{
    is_observable, same_query, Capabilities, FnHandle, LiveQuery, LiveQueryHandle,
    ObserveCallbacks, ObserveChangesCallbacks, SharedQuery, Stoppable,
};
