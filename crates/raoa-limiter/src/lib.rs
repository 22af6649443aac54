//! Admission control for the RAOA storage engine.
//!
//! Every operation that performs blocking filesystem work or heavy CPU work
//! is wrapped in [`AdmissionLimiter::limit`] so that the number of such
//! operations in flight never exceeds a configured capacity.
//!
//! # Variants
//!
//! - [`FlatLimiter`] -- fixed capacity, atomic running count, FIFO queue of
//!   waiters. A slot is released when the wrapped future completes or is
//!   dropped.
//! - [`ReentrantLimiter`] -- a flat root limiter plus an ambient
//!   [`AdmissionContext`] carried in task-local storage. A `limit` call made
//!   from inside an operation already admitted by the same limiter does not
//!   contend for a root slot; it is admitted through that operation's private
//!   sub-limiter of capacity 1, so nested fan-out is serialized instead of
//!   deadlocking against its own parent.
//!
//! The ambient context does not cross `tokio::spawn`; capture it with
//! [`AdmissionContext::current`] and re-enter it with
//! [`AdmissionContext::scope`] in the spawned task.

pub mod admission;
pub mod config;
pub mod context;
pub mod flat;
pub mod reentrant;

pub use admission::AdmissionLimiter;
pub use config::LimiterConfig;
pub use context::AdmissionContext;
pub use flat::{FlatLimiter, Slot};
pub use reentrant::ReentrantLimiter;
