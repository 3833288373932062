//! The media backend seam.
//!
//! Job processing only talks to remote media through [`MediaBackend`], so the
//! pipeline can be exercised without ffmpeg or network access.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use url::Url;

use crate::command::is_remote_input;
use crate::error::{MediaError, MediaResult};
use crate::security::{ensure_public_host, validate_media_url};
use crate::thumbnail::FrameSpec;
use crate::{download, probe, thumbnail};

/// Maximum number of redirects followed by the HTTP client.
const MAX_REDIRECTS: usize = 5;

/// Operations the job pipeline needs from the outside world.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Lightweight existence check against the remote resource.
    async fn check_reachable(&self, url: &Url, timeout: Duration) -> MediaResult<()>;

    /// Probe the duration (seconds) of a URL or local file.
    async fn probe_duration(&self, input: &str, timeout: Duration) -> MediaResult<f64>;

    /// Download the first `max_bytes` of `url` into `dest`.
    async fn download_sample(
        &self,
        url: &Url,
        dest: &Path,
        max_bytes: u64,
        timeout: Duration,
    ) -> MediaResult<u64>;

    /// Write one JPEG frame of `input` to `output`.
    async fn extract_frame(
        &self,
        input: &str,
        output: &Path,
        spec: &FrameSpec,
        timeout: Duration,
    ) -> MediaResult<()>;
}

/// Production backend: reqwest for HTTP, ffprobe/ffmpeg subprocesses for media.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    client: Client,
}

impl FfmpegBackend {
    /// Create a backend with an HTTP client that refuses to follow redirects
    /// into internal address space.
    pub fn new() -> MediaResult<Self> {
        let policy = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if validate_media_url(attempt.url().as_str()).is_err() {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .redirect(policy)
            .user_agent(concat!("strmshot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn check_reachable(&self, url: &Url, timeout: Duration) -> MediaResult<()> {
        ensure_public_host(url).await?;
        download::check_reachable(&self.client, url, timeout).await
    }

    async fn probe_duration(&self, input: &str, timeout: Duration) -> MediaResult<f64> {
        recheck_remote(input).await?;
        probe::probe_duration(input, timeout).await
    }

    async fn download_sample(
        &self,
        url: &Url,
        dest: &Path,
        max_bytes: u64,
        timeout: Duration,
    ) -> MediaResult<u64> {
        download::download_sample(&self.client, url, dest, max_bytes, timeout).await
    }

    async fn extract_frame(
        &self,
        input: &str,
        output: &Path,
        spec: &FrameSpec,
        timeout: Duration,
    ) -> MediaResult<()> {
        recheck_remote(input).await?;
        thumbnail::generate_thumbnail(input, output, spec, timeout).await
    }
}

/// Re-resolve a remote input right before ffmpeg or ffprobe opens it, so a
/// DNS answer that changed since the reachability check is caught.
///
/// Redirects followed inside ffmpeg's own HTTP client are not re-validated;
/// only the protocol whitelist applies to them.
async fn recheck_remote(input: &str) -> MediaResult<()> {
    if !is_remote_input(input) {
        return Ok(());
    }
    let url = validate_media_url(input)?;
    ensure_public_host(&url).await
}
