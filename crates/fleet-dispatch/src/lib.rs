//! Async operation runner (C11, §4.8): progress-streaming task spawner,
//! `start_mutex` coalescing, and deadline-based readiness polling.
//!
//! Request selection & reaction (C10) lives in `fleet_registry::select`
//! alongside the instance store it operates on; this crate covers only
//! the operation-lifecycle half of §4.8.

pub mod operation;
pub mod retry;
pub mod start_coalesce;

pub use operation::{send_progress, Operation, DEFAULT_PROGRESS_BUFFER};
pub use retry::try_action_for;
pub use start_coalesce::{boxed, StartCoalescer};
