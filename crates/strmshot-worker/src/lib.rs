//! Batch thumbnail processing.
//!
//! This crate provides:
//! - The per-job pipeline ([`JobProcessor`]) written against `MediaBackend`
//! - The persistent [`DurationCache`]
//! - The batch orchestrator ([`BatchRunner`]) and its event sinks
//! - `.strm` discovery and media-root scoping

pub mod batch;
pub mod config;
pub mod duration_cache;
pub mod error;
pub mod logging;
pub mod processor;
pub mod scan;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{resolve_concurrency, BatchRunner, BatchSummary};
pub use config::WorkerConfig;
pub use duration_cache::{CacheEntry, DurationCache};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use processor::{artifact_paths, parse_strm, ArtifactPaths, JobProcessor};
pub use scan::{ensure_within_root, find_strm_files, scan_directory};
pub use sink::{event_channel, EventReceiver, EventSender, EventSink, NullSink};
