//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrency used when a batch does not request one
    pub default_concurrency: usize,
    /// System-wide hard maximum concurrency
    pub max_concurrency: usize,
    /// Ceiling applied to small batches
    pub min_concurrency: usize,
    /// Batches smaller than this are clamped to `min_concurrency`
    pub small_batch_threshold: usize,
    /// Batches larger than this may scale up by `large_batch_multiplier`
    pub large_batch_threshold: usize,
    pub large_batch_multiplier: usize,
    /// Directory for per-job temporary sample files
    pub work_dir: PathBuf,
    /// HEAD / ranged GET existence check
    pub reachability_timeout: Duration,
    /// Direct ffprobe against the remote URL
    pub probe_timeout: Duration,
    /// Sample download plus probe of the sample
    pub sample_timeout: Duration,
    /// Frame extraction
    pub extract_timeout: Duration,
    /// Bytes fetched for the fallback probe
    pub sample_bytes: u64,
    /// Thumbnails smaller than this are treated as corrupt
    pub min_thumbnail_bytes: u64,
    pub max_width: u32,
    pub max_height: u32,
    /// Durable location of the duration cache
    pub cache_path: PathBuf,
    /// Auto-save period for the duration cache
    pub cache_save_interval: Duration,
    /// Entries older than this are pruned before each auto-save
    pub cache_max_age: Option<Duration>,
    /// Sources and output directories must live under this root
    pub media_root: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 4,
            max_concurrency: 16,
            min_concurrency: 2,
            small_batch_threshold: 10,
            large_batch_threshold: 100,
            large_batch_multiplier: 2,
            work_dir: std::env::temp_dir().join("strmshot"),
            reachability_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(15),
            sample_timeout: Duration::from_secs(30),
            extract_timeout: Duration::from_secs(60),
            sample_bytes: 8 * 1024 * 1024, // 8 MiB
            min_thumbnail_bytes: 1024,
            max_width: 1920,
            max_height: 1080,
            cache_path: PathBuf::from("data/duration-cache.json"),
            cache_save_interval: Duration::from_secs(60),
            cache_max_age: None,
            media_root: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_concurrency: env_parse("WORKER_DEFAULT_CONCURRENCY")
                .unwrap_or(defaults.default_concurrency),
            max_concurrency: env_parse("WORKER_MAX_CONCURRENCY").unwrap_or(defaults.max_concurrency),
            min_concurrency: env_parse("WORKER_MIN_CONCURRENCY").unwrap_or(defaults.min_concurrency),
            small_batch_threshold: env_parse("WORKER_SMALL_BATCH")
                .unwrap_or(defaults.small_batch_threshold),
            large_batch_threshold: env_parse("WORKER_LARGE_BATCH")
                .unwrap_or(defaults.large_batch_threshold),
            large_batch_multiplier: env_parse("WORKER_LARGE_BATCH_MULTIPLIER")
                .unwrap_or(defaults.large_batch_multiplier),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            reachability_timeout: env_secs(
                "WORKER_REACHABILITY_TIMEOUT_SECS",
                defaults.reachability_timeout,
            ),
            probe_timeout: env_secs("WORKER_PROBE_TIMEOUT_SECS", defaults.probe_timeout),
            sample_timeout: env_secs("WORKER_SAMPLE_TIMEOUT_SECS", defaults.sample_timeout),
            extract_timeout: env_secs("WORKER_EXTRACT_TIMEOUT_SECS", defaults.extract_timeout),
            sample_bytes: env_parse("WORKER_SAMPLE_BYTES").unwrap_or(defaults.sample_bytes),
            min_thumbnail_bytes: env_parse("WORKER_MIN_THUMBNAIL_BYTES")
                .unwrap_or(defaults.min_thumbnail_bytes),
            max_width: env_parse("WORKER_MAX_WIDTH").unwrap_or(defaults.max_width),
            max_height: env_parse("WORKER_MAX_HEIGHT").unwrap_or(defaults.max_height),
            cache_path: std::env::var("DURATION_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            cache_save_interval: env_secs("DURATION_CACHE_SAVE_SECS", defaults.cache_save_interval),
            cache_max_age: env_parse::<u64>("DURATION_CACHE_MAX_AGE_DAYS")
                .map(|days| Duration::from_secs(days * 24 * 60 * 60)),
            media_root: None,
        }
    }

    /// Restrict sources and outputs to `root`.
    pub fn with_media_root(mut self, root: Option<PathBuf>) -> Self {
        self.media_root = root;
        self
    }

    /// Reject settings the batch runner cannot honour.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.min_concurrency < 1 || self.default_concurrency < 1 || self.max_concurrency < 1 {
            return Err(WorkerError::config_error(
                "concurrency settings must be at least 1",
            ));
        }
        if self.min_concurrency > self.max_concurrency {
            return Err(WorkerError::config_error(format!(
                "WORKER_MIN_CONCURRENCY ({}) exceeds WORKER_MAX_CONCURRENCY ({})",
                self.min_concurrency, self.max_concurrency
            )));
        }
        if self.large_batch_multiplier < 1 {
            return Err(WorkerError::config_error(
                "WORKER_LARGE_BATCH_MULTIPLIER must be at least 1",
            ));
        }
        if !(self.reachability_timeout < self.probe_timeout
            && self.probe_timeout < self.sample_timeout
            && self.sample_timeout < self.extract_timeout)
        {
            return Err(WorkerError::config_error(
                "timeouts must satisfy reachability < probe < sample < extract",
            ));
        }
        if self.sample_bytes == 0 {
            return Err(WorkerError::config_error("WORKER_SAMPLE_BYTES must be positive"));
        }
        Ok(())
    }
}
