//! Application state.

use std::sync::Arc;

use strmshot_media::{FfmpegBackend, MediaBackend};
use strmshot_queue::TaskQueue;
use strmshot_worker::{BatchRunner, DurationCache, JobProcessor, WorkerConfig, WorkerError};
use tracing::info;

use crate::config::ApiConfig;
use crate::error::ApiResult;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker: Arc<WorkerConfig>,
    pub queue: TaskQueue,
    pub cache: Arc<DurationCache>,
    pub runner: Arc<BatchRunner>,
}

impl AppState {
    /// Build state backed by ffmpeg, loading the duration cache from disk.
    pub async fn new(config: ApiConfig, worker: WorkerConfig) -> ApiResult<Self> {
        let worker = worker.with_media_root(config.media_root.clone());
        worker.validate()?;

        let cache = DurationCache::open(worker.cache_path.clone()).await?;
        if let Some(max_age) = worker.cache_max_age {
            cache.prune_older_than(max_age);
        }
        info!(
            path = %cache.path().display(),
            entries = cache.len(),
            "Duration cache loaded"
        );

        let backend = FfmpegBackend::new().map_err(WorkerError::from)?;
        Self::from_parts(config, worker, Arc::new(backend), Arc::new(cache))
    }

    /// Assemble state from an already-built backend and cache.
    pub fn from_parts(
        config: ApiConfig,
        worker: WorkerConfig,
        backend: Arc<dyn MediaBackend>,
        cache: Arc<DurationCache>,
    ) -> ApiResult<Self> {
        let worker = Arc::new(worker);
        let queue = TaskQueue::new(worker.default_concurrency)?;
        let processor = Arc::new(JobProcessor::new(backend, cache.clone(), worker.clone()));
        let runner = Arc::new(BatchRunner::new(queue.clone(), processor, worker.clone()));

        Ok(Self {
            config,
            worker,
            queue,
            cache,
            runner,
        })
    }
}
