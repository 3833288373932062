//! Structured job logging utilities.
//!
//! Every narration line goes to `tracing` with the job identifier attached
//! and, for user-facing lines, to the batch's event sink as a `log` event.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use strmshot_models::BatchEvent;
use tracing::{debug, error, info, warn, Span};

use crate::sink::{EventSink, NullSink};

/// Job logger for structured logging with consistent formatting.
#[derive(Clone)]
pub struct JobLogger {
    job_id: String,
    label: String,
    operation: &'static str,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLogger")
            .field("job_id", &self.job_id)
            .field("operation", &self.operation)
            .finish()
    }
}

impl JobLogger {
    /// Create a logger for one source identifier.
    ///
    /// Event messages are prefixed with the identifier's file name.
    pub fn new(job_id: &str, operation: &'static str, sink: Arc<dyn EventSink>) -> Self {
        let label = Path::new(job_id)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| job_id.to_string());

        Self {
            job_id: job_id.to_string(),
            label,
            operation,
            sink,
        }
    }

    /// A logger whose events go nowhere; tracing output is kept.
    pub fn detached(job_id: &str, operation: &'static str) -> Self {
        Self::new(job_id, operation, Arc::new(NullSink))
    }

    fn line(&self, message: &str) -> String {
        format!("{}: {}", self.label, message)
    }

    /// Progress narration (info level).
    pub fn info(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job progress: {}", message
        );
        self.sink.emit(BatchEvent::info(self.line(message)));
    }

    /// Terminal success line.
    pub fn success(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job completed: {}", message
        );
        self.sink.emit(BatchEvent::success(self.line(message)));
    }

    /// Terminal failure line.
    pub fn error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job error: {}", message
        );
        self.sink.emit(BatchEvent::error(self.line(message)));
    }

    /// Recoverable problem; tracing only.
    pub fn warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    /// Diagnostic detail; tracing only.
    pub fn debug(&self, message: &str) {
        debug!(
            job_id = %self.job_id,
            operation = self.operation,
            "{}", message
        );
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}
