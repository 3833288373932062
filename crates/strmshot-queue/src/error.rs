//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Misconfiguration of the queue itself. Job failures never surface here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid concurrency limit {0}: must be at least 1")]
    InvalidConcurrency(usize),
}

/// Why a submitted job's handle did not yield a value.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The job ran and returned this error, unchanged
    #[error("{0}")]
    Failed(E),

    /// Removed by `clear()` before it started; the job never ran
    #[error("Job discarded before it started")]
    Discarded,

    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The runtime dropped the task (e.g. during shutdown)
    #[error("Job cancelled")]
    Cancelled,
}

impl<E> TaskError<E> {
    /// The job's own error, if that is what this is.
    pub fn into_failed(self) -> Option<E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, TaskError::Discarded)
    }
}
