//! Scheduling: debouncing bursts and coalescing context resumptions.
//!
//! # Modules
//!
//! - [`debounce`]: trailing-edge [`Debouncer`].
//! - [`flush`]: per-context [`FlushScheduler`].
//! - [`bind`]: [`Callback`] sum type and context binding.
//! - [`ready`]: [`ReadyTracker`] for outstanding requests.

pub mod bind;
pub mod debounce;
pub mod flush;
pub mod ready;

pub use bind::{Callback, Handlers};
pub use debounce::{debounce, Debouncer};
pub use flush::{AfterRun, FlushScheduler};
pub use ready::ReadyTracker;
