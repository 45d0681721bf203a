//! Reactive layer: batched streams over live queries.
//!
//! # Overview
//!
//! [`LiveQueryObserver`] turns per-document callbacks into debounced
//! [`Batch`](crate::types::Batch)es. [`MulticastCursor`] shares one observer
//! between many sinks with lazy start and ref-counted teardown.
//! [`CursorDiffer`] converts batches into the edit lists a list renderer
//! applies.
//!
//! # Modules
//!
//! - [`subscriber`]: [`Subscriber`] sinks and [`Subscription`]s.
//! - [`observer`]: [`LiveQueryObserver`].
//! - [`multicast`]: [`MulticastCursor`].
//! - [`differ`]: [`CursorDiffer`] and [`CursorDifferFactory`].

pub mod differ;
pub mod multicast;
pub mod observer;
pub mod subscriber;

pub use differ::{CursorDiffer, CursorDifferFactory, DiffOutcome};
pub use multicast::MulticastCursor;
pub use observer::{LiveQueryObserver, ObserverPhase};
pub use subscriber::{Subscriber, Subscription};
