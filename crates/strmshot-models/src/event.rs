//! Batch event stream vocabulary.
//!
//! Every event is a tagged JSON record (`{"type": "...", ...}`) so clients
//! can dispatch on `type` without knowing the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a narration line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Error,
    Success,
}

/// Aggregate counters for one batch.
///
/// `processed == succeeded + failed` after every settlement and
/// `processed <= total` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchProgress {
    /// Fresh counters for a batch of `total` jobs.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Record a settled job that succeeded (or was skipped).
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    /// Record a settled job that failed.
    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }
}

/// Event type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchEventType {
    Log,
    Progress,
    Failed,
    Complete,
}

impl BatchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchEventType::Log => "log",
            BatchEventType::Progress => "progress",
            BatchEventType::Failed => "failed",
            BatchEventType::Complete => "complete",
        }
    }
}

/// One event on a batch stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Human-readable narration of one job's progress
    Log {
        message: String,
        level: LogLevel,
        timestamp: DateTime<Utc>,
    },

    /// Full counter snapshot after a settlement
    Progress {
        #[serde(flatten)]
        progress: BatchProgress,
    },

    /// One job's terminal failure
    Failed { identifier: String },

    /// Terminal event; exactly one per batch
    Complete {
        #[serde(flatten)]
        progress: BatchProgress,
        #[serde(rename = "failedIdentifiers")]
        failed_identifiers: Vec<String>,
    },
}

impl BatchEvent {
    /// Create a log event.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        BatchEvent::Log {
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Success, message)
    }

    /// Create a progress snapshot event.
    pub fn progress(progress: BatchProgress) -> Self {
        BatchEvent::Progress { progress }
    }

    /// Create a failed-item event.
    pub fn failed(identifier: impl Into<String>) -> Self {
        BatchEvent::Failed {
            identifier: identifier.into(),
        }
    }

    /// Create the terminal event.
    pub fn complete(progress: BatchProgress, failed_identifiers: Vec<String>) -> Self {
        BatchEvent::Complete {
            progress,
            failed_identifiers,
        }
    }

    /// Get the event type.
    pub fn event_type(&self) -> BatchEventType {
        match self {
            BatchEvent::Log { .. } => BatchEventType::Log,
            BatchEvent::Progress { .. } => BatchEventType::Progress,
            BatchEvent::Failed { .. } => BatchEventType::Failed,
            BatchEvent::Complete { .. } => BatchEventType::Complete,
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchEvent::Complete { .. })
    }
}
