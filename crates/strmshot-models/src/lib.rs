//! Shared data models for the strmshot thumbnail service.
//!
//! This crate provides Serde-serializable types for:
//! - Batch options (overwrite mode, thumbnail position, quality)
//! - The batch event stream vocabulary
//! - Per-job outcomes

pub mod event;
pub mod options;
pub mod outcome;

// Re-export common types
pub use event::{BatchEvent, BatchEventType, BatchProgress, LogLevel};
pub use options::{BatchOptions, InvalidPosition, OverwriteMode, ThumbnailPosition};
pub use outcome::{JobDetails, JobOutcome};
