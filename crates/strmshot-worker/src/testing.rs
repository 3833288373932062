//! Test doubles shared by the worker's unit tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use strmshot_media::{FrameSpec, MediaBackend, MediaError, MediaResult};
use strmshot_models::BatchEvent;
use url::Url;

use crate::sink::EventSink;

/// Write `<dir>/<stem>.strm` pointing at `url`; returns the identifier.
pub fn write_strm(dir: &Path, stem: &str, url: &str) -> String {
    let path = dir.join(format!("{}.strm", stem));
    std::fs::write(&path, format!("{}\n", url)).unwrap();
    path.to_string_lossy().to_string()
}

/// In-memory stand-in for ffmpeg and the network.
pub struct FakeBackend {
    durations: HashMap<String, f64>,
    unreachable: HashSet<String>,
    sample_duration: Option<f64>,
    frame_bytes: usize,
    extract_delay: Duration,
    pub reachability_checks: AtomicUsize,
    pub probes: AtomicUsize,
    pub samples: AtomicUsize,
    pub extracts: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            durations: HashMap::new(),
            unreachable: HashSet::new(),
            sample_duration: None,
            frame_bytes: 4096,
            extract_delay: Duration::ZERO,
            reachability_checks: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            samples: AtomicUsize::new(0),
            extracts: AtomicUsize::new(0),
        }
    }

    pub fn with_duration(mut self, url: &str, duration: f64) -> Self {
        self.durations.insert(url.to_string(), duration);
        self
    }

    pub fn unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    pub fn with_sample_duration(mut self, duration: f64) -> Self {
        self.sample_duration = Some(duration);
        self
    }

    pub fn with_frame_bytes(mut self, bytes: usize) -> Self {
        self.frame_bytes = bytes;
        self
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = delay;
        self
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn check_reachable(&self, url: &Url, _timeout: Duration) -> MediaResult<()> {
        self.reachability_checks.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.contains(url.as_str()) {
            return Err(MediaError::unreachable(url.as_str(), "server answered 404 Not Found"));
        }
        Ok(())
    }

    async fn probe_duration(&self, input: &str, _timeout: Duration) -> MediaResult<f64> {
        if let Some(duration) = self.durations.get(input) {
            self.probes.fetch_add(1, Ordering::SeqCst);
            return Ok(*duration);
        }
        if input.starts_with("http") {
            self.probes.fetch_add(1, Ordering::SeqCst);
            return Err(MediaError::ffprobe_failed("FFprobe failed", None));
        }
        self.sample_duration
            .ok_or_else(|| MediaError::InvalidVideo("sample unreadable".to_string()))
    }

    async fn download_sample(
        &self,
        _url: &Url,
        dest: &Path,
        max_bytes: u64,
        _timeout: Duration,
    ) -> MediaResult<u64> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let bytes = max_bytes.min(512);
        tokio::fs::write(dest, vec![0u8; bytes as usize]).await?;
        Ok(bytes)
    }

    async fn extract_frame(
        &self,
        _input: &str,
        output: &Path,
        _spec: &FrameSpec,
        _timeout: Duration,
    ) -> MediaResult<()> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        if !self.extract_delay.is_zero() {
            tokio::time::sleep(self.extract_delay).await;
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, vec![0xFFu8; self.frame_bytes]).await?;
        Ok(())
    }
}

/// Sink that records every event.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<BatchEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: BatchEvent) {
        self.events.lock().push(event);
    }
}
