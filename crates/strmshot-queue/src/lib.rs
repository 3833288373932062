//! In-process bounded-concurrency task queue.
//!
//! This crate provides:
//! - [`TaskQueue`]: runs async jobs with a hard ceiling on how many run at once
//! - Priority submission with arrival-order tie breaking
//! - Point-in-time status, drain for graceful shutdown and clear for
//!   discarding work that has not started

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult, TaskError};
pub use queue::{QueueStats, QueueStatus, TaskHandle, TaskQueue};
