//! Test helpers: state wired to a backend that never touches the network.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strmshot_media::{FrameSpec, MediaBackend, MediaError, MediaResult};
use strmshot_worker::{DurationCache, WorkerConfig};
use url::Url;

use crate::config::ApiConfig;
use crate::state::AppState;

/// Backend for which every remote host is down.
pub struct OfflineBackend;

#[async_trait]
impl MediaBackend for OfflineBackend {
    async fn check_reachable(&self, url: &Url, _timeout: Duration) -> MediaResult<()> {
        Err(MediaError::unreachable(url.as_str(), "connection refused"))
    }

    async fn probe_duration(&self, _input: &str, _timeout: Duration) -> MediaResult<f64> {
        Err(MediaError::ffprobe_failed("FFprobe failed", None))
    }

    async fn download_sample(
        &self,
        url: &Url,
        _dest: &Path,
        _max_bytes: u64,
        _timeout: Duration,
    ) -> MediaResult<u64> {
        Err(MediaError::unreachable(url.as_str(), "connection refused"))
    }

    async fn extract_frame(
        &self,
        _input: &str,
        _output: &Path,
        _spec: &FrameSpec,
        _timeout: Duration,
    ) -> MediaResult<()> {
        Err(MediaError::ffmpeg_failed("FFmpeg failed", None, Some(1)))
    }
}

/// State whose cache and scratch space live under `dir`.
pub fn test_state(config: ApiConfig, dir: &Path) -> AppState {
    let worker = WorkerConfig {
        work_dir: dir.join("work"),
        cache_path: dir.join("duration-cache.json"),
        ..Default::default()
    }
    .with_media_root(config.media_root.clone());
    let cache = Arc::new(DurationCache::new(dir.join("duration-cache.json")));

    AppState::from_parts(config, worker, Arc::new(OfflineBackend), cache).unwrap()
}
