//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Path outside allowed scope: {0}")]
    OutOfScope(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Media(#[from] strmshot_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] strmshot_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    pub fn out_of_scope(msg: impl Into<String>) -> Self {
        Self::OutOfScope(msg.into())
    }

    /// Errors the caller must fix before a batch can start.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WorkerError::ConfigError(_) | WorkerError::InvalidOptions(_) | WorkerError::Queue(_)
        )
    }
}

impl From<validator::ValidationErrors> for WorkerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidOptions(errors.to_string())
    }
}
