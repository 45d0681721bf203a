//! Runtime primitives: contexts, macrotasks, timers and the host bundle.
//!
//! # Modules
//!
//! - [`context`]: [`Context`] task-ordering domains.
//! - [`macrotask`]: [`MacroTask`] cancellable deferred tasks.
//! - [`timer`]: [`TimerHost`] and the Tokio-backed [`TokioTimers`].
//! - [`emitter`]: typed synchronous fan-out ([`Emitter<T>`]).
//! - [`host`]: [`Host`], one per process.

pub mod context;
pub mod emitter;
pub mod host;
pub mod macrotask;
pub mod timer;

pub use context::{Context, ContextId};
pub use emitter::{Emitter, ListenerId};
pub use host::Host;
pub use macrotask::{MacroTask, MacroTaskOptions};
pub use timer::{TimerHandle, TimerHost, TokioTimers};
