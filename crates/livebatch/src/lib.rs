//! Batching and flush scheduling for live queries.
//!
//! A live query reports every change to its result set through synchronous
//! callbacks. This crate collects those callbacks into ordered batches of
//! [`ChangeRecord`]s behind a debounce window, fans batches out to many
//! subscribers, adapts them to a list renderer's edit lists, and coalesces
//! the "resume this execution context" requests that many observers raise
//! in the same burst.

pub mod config;
pub mod error;
pub mod query;
pub mod reactive;
pub mod runtime;
pub mod schedule;
pub mod types;

pub use config::{LiveConfig, ObserveMode, ObserverOptions};
pub use error::{CallError, LiveError, QueryError, Result};
pub use query::{ContextBoundQuery, LiveQuery, MemoryLiveQuery, ResourceHandle, SharedQuery};
pub use reactive::{
    CursorDiffer, CursorDifferFactory, DiffOutcome, LiveQueryObserver, MulticastCursor,
    Subscriber, Subscription,
};
pub use runtime::{Context, Host};
pub use schedule::{Callback, FlushScheduler, ReadyTracker};
pub use types::{Batch, ChangeRecord, DiffRecord, Document};
