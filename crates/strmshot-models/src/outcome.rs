//! Terminal outcome of a single job.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    /// Thumbnail image path
    pub thumbnail: PathBuf,
    /// Sidecar metadata path
    pub metadata: PathBuf,
    /// Probed duration in seconds
    pub duration: f64,
    /// Extraction offset in seconds
    pub offset: f64,
    /// Whether the duration came from the cache
    pub cache_hit: bool,
}

/// Result of running one source through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { details: JobDetails },
    /// Output already existed; counts toward success
    Skipped { reason: String },
    Failed { reason: String },
}

impl JobOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        JobOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        JobOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded { .. } => "succeeded",
            JobOutcome::Skipped { .. } => "skipped",
            JobOutcome::Failed { .. } => "failed",
        }
    }

    /// Skipped jobs count as successes in aggregate reporting.
    pub fn is_success(&self) -> bool {
        !matches!(self, JobOutcome::Failed { .. })
    }
}
