//! Per-job processor.
//!
//! Carries one `.strm` source through the pipeline:
//! 1. Resolve artifact paths (`<stem>-thumb.jpg`, `<stem>.nfo`)
//! 2. Skip when the thumbnail exists and the batch is in skip-existing mode
//! 3. Read the descriptor and pass the URL through the safety gate
//! 4. Reachability check
//! 5. Duration: cache, then direct probe, then probe of a downloaded sample
//! 6. Extract one frame at the offset picked by the position policy
//! 7. Reject undersized output
//! 8. Write the `.nfo` sidecar

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use strmshot_media::{
    remove_if_exists, validate_media_url, write_sidecar, FrameSpec, MediaBackend, MediaError,
    SidecarMetadata,
};
use strmshot_models::{BatchOptions, JobDetails, JobOutcome, OverwriteMode};
use url::Url;

use crate::config::WorkerConfig;
use crate::duration_cache::DurationCache;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::scan::{ensure_output_within_root, ensure_within_root};

/// Suffix appended to the source stem for the thumbnail file.
pub const THUMBNAIL_SUFFIX: &str = "-thumb.jpg";
/// Extension of the sidecar metadata file.
pub const SIDECAR_EXTENSION: &str = "nfo";

/// Where a job writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub stem: String,
    pub thumbnail: PathBuf,
    pub metadata: PathBuf,
}

/// Compute artifact paths for `source`, next to it unless `output_dir` is set.
pub fn artifact_paths(source: &Path, output_dir: Option<&Path>) -> WorkerResult<ArtifactPaths> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WorkerError::invalid_source(format!("{} has no file name", source.display())))?;

    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    Ok(ArtifactPaths {
        thumbnail: dir.join(format!("{}{}", stem, THUMBNAIL_SUFFIX)),
        metadata: dir.join(format!("{}.{}", stem, SIDECAR_EXTENSION)),
        stem,
    })
}

/// Media URL from `.strm` content: the first line that is neither blank nor
/// a `#` comment.
pub fn parse_strm(contents: &str) -> Option<&str> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Run `fut`, converting an elapsed deadline into a timeout error.
async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> WorkerResult<T>
where
    F: Future<Output = Result<T, MediaError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(MediaError::timeout(operation, limit).into()),
    }
}

fn ensure_valid_duration(duration: f64) -> WorkerResult<f64> {
    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(MediaError::InvalidVideo(format!("non-positive duration {}", duration)).into())
    }
}

/// Uniform sample from the open interval (0, 1).
fn random_unit() -> f64 {
    rand::rng().sample(rand::distr::Open01)
}

/// Executes the thumbnail pipeline for one source.
pub struct JobProcessor {
    backend: Arc<dyn MediaBackend>,
    cache: Arc<DurationCache>,
    config: Arc<WorkerConfig>,
}

impl JobProcessor {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        cache: Arc<DurationCache>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            backend,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<DurationCache> {
        &self.cache
    }

    /// Process one source. Never fails: every error becomes a `failed`
    /// outcome carrying the error text.
    pub async fn process(&self, identifier: &str, options: &BatchOptions, log: &JobLogger) -> JobOutcome {
        match self.run(identifier, options, log).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log.warning(&e.to_string());
                JobOutcome::failed(e.to_string())
            }
        }
    }

    async fn run(&self, identifier: &str, options: &BatchOptions, log: &JobLogger) -> WorkerResult<JobOutcome> {
        let source = Path::new(identifier);
        let paths = artifact_paths(source, options.output_directory.as_deref())?;

        // Scope before the skip check: artifacts outside the root are never probed
        if let Some(root) = &self.config.media_root {
            ensure_within_root(source, root).await?;
            if let Some(out) = &options.output_directory {
                ensure_output_within_root(out, root).await?;
            }
        }

        if options.overwrite_mode == OverwriteMode::SkipExisting
            && tokio::fs::try_exists(&paths.thumbnail).await.unwrap_or(false)
        {
            return Ok(JobOutcome::skipped("thumbnail already exists"));
        }

        let url = self.read_source_url(source).await?;

        log.info("Checking source is reachable");
        bounded(
            "reachability check",
            self.config.reachability_timeout,
            self.backend
                .check_reachable(&url, self.config.reachability_timeout),
        )
        .await?;

        let (duration, cache_hit) = match self.cache.get(url.as_str()) {
            Some(duration) => {
                log.debug("Duration cache hit");
                (duration, true)
            }
            None => {
                let duration = self.probe_with_fallback(&url, &paths.stem, log).await?;
                self.cache.set(url.as_str(), duration);
                (duration, false)
            }
        };

        let offset = options.position.offset(duration, random_unit());
        let spec = FrameSpec {
            offset,
            max_width: self.config.max_width,
            max_height: self.config.max_height,
            qscale: options.jpeg_qscale(),
        };

        log.info(&format!("Extracting frame at {:.1}s of {:.1}s", offset, duration));
        if let Err(e) = self.extract(&url, &paths.thumbnail, &spec).await {
            let _ = remove_if_exists(&paths.thumbnail).await;
            return Err(e);
        }

        if let Err(e) =
            strmshot_media::validate_thumbnail(&paths.thumbnail, self.config.min_thumbnail_bytes).await
        {
            let _ = remove_if_exists(&paths.thumbnail).await;
            return Err(e.into());
        }

        let thumbnail_file = paths
            .thumbnail
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        write_sidecar(
            &paths.metadata,
            &SidecarMetadata {
                title: paths.stem.clone(),
                source_url: url.to_string(),
                thumbnail_file,
                created: Utc::now(),
                duration: Some(duration),
            },
        )
        .await?;

        Ok(JobOutcome::Succeeded {
            details: JobDetails {
                thumbnail: paths.thumbnail,
                metadata: paths.metadata,
                duration,
                offset,
                cache_hit,
            },
        })
    }

    async fn read_source_url(&self, source: &Path) -> WorkerResult<Url> {
        let contents = tokio::fs::read_to_string(source).await.map_err(|e| {
            WorkerError::invalid_source(format!("cannot read {}: {}", source.display(), e))
        })?;

        let raw = parse_strm(&contents)
            .ok_or_else(|| WorkerError::invalid_source("descriptor contains no URL"))?;

        Ok(validate_media_url(raw)?)
    }

    async fn probe_with_fallback(&self, url: &Url, stem: &str, log: &JobLogger) -> WorkerResult<f64> {
        log.info("Probing duration");

        let direct = bounded(
            "duration probe",
            self.config.probe_timeout,
            self.backend
                .probe_duration(url.as_str(), self.config.probe_timeout),
        )
        .await
        .and_then(ensure_valid_duration);

        match direct {
            Ok(duration) => Ok(duration),
            Err(e) => {
                log.info(&format!("Direct probe failed ({}), probing a sample instead", e));
                let duration = self.probe_sample(url, stem).await?;
                ensure_valid_duration(duration)
            }
        }
    }

    /// Download a byte-range sample into a private temp file and probe it.
    ///
    /// The temp file is removed on every path out of this function.
    async fn probe_sample(&self, url: &Url, stem: &str) -> WorkerResult<f64> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let prefix: String = format!(
            "sample-{}-",
            stem.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(32)
                .collect::<String>()
        );
        let sample = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".bin")
            .tempfile_in(&self.config.work_dir)?
            .into_temp_path();

        let timeout = self.config.sample_timeout;
        let result = bounded("sample probe", timeout, async {
            self.backend
                .download_sample(url, &sample, self.config.sample_bytes, timeout)
                .await?;
            self.backend
                .probe_duration(&sample.to_string_lossy(), self.config.probe_timeout)
                .await
        })
        .await;

        if let Err(e) = sample.close() {
            tracing::debug!(error = %e, "Failed to remove sample file");
        }

        result
    }

    async fn extract(&self, url: &Url, output: &Path, spec: &FrameSpec) -> WorkerResult<()> {
        bounded(
            "frame extraction",
            self.config.extract_timeout,
            self.backend
                .extract_frame(url.as_str(), output, spec, self.config.extract_timeout),
        )
        .await
    }
}
