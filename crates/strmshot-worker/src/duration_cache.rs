//! Persistent URL -> duration cache.
//!
//! Probing a remote video costs a network round trip and an ffprobe run, and
//! the duration of an immutable remote file never changes, so entries are
//! kept until an age-based prune removes them.
//!
//! # Persistence
//!
//! The durable form is a JSON object keyed by `"duration:" + url`:
//!
//! ```json
//! { "duration:https://cdn/x.mkv": { "duration": 5400.2, "fetchedAt": "2024-03-09T14:30:00Z" } }
//! ```
//!
//! A bare number is accepted in place of the object and stamped with the
//! load time. Saves go through a temp file and rename.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};

const KEY_PREFIX: &str = "duration:";

/// One cached duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub duration: f64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Full(CacheEntry),
    Bare(f64),
}

fn cache_key(url: &str) -> String {
    format!("{}{}", KEY_PREFIX, url)
}

/// Thread-safe duration cache with a dirty flag for cheap periodic saves.
#[derive(Debug)]
pub struct DurationCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
    dirty: AtomicBool,
}

impl DurationCache {
    /// Create an empty cache persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Create a cache and load whatever is on disk.
    pub async fn open(path: impl Into<PathBuf>) -> WorkerResult<Self> {
        let cache = Self::new(path);
        cache.load().await?;
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached duration for `url`.
    pub fn get(&self, url: &str) -> Option<f64> {
        let hit = self.entries.read().get(&cache_key(url)).map(|e| e.duration);
        if hit.is_some() {
            counter!("strmshot_duration_cache_hits_total").increment(1);
        } else {
            counter!("strmshot_duration_cache_misses_total").increment(1);
        }
        hit
    }

    pub fn has(&self, url: &str) -> bool {
        self.entries.read().contains_key(&cache_key(url))
    }

    /// Record a probed duration.
    pub fn set(&self, url: &str, duration: f64) {
        self.insert(
            url,
            CacheEntry {
                duration,
                fetched_at: Utc::now(),
            },
        );
    }

    /// Record an entry with an explicit timestamp.
    pub fn insert(&self, url: &str, entry: CacheEntry) {
        self.entries.write().insert(cache_key(url), entry);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether there are changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Remove entries fetched more than `max_age` ago. Returns how many.
    pub fn prune_older_than(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;

        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, e| e.fetched_at >= cutoff);
            before - entries.len()
        };

        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
            info!(removed, "Pruned stale duration cache entries");
        }
        removed
    }

    /// Merge the durable copy into memory. Returns the number of entries read.
    ///
    /// A missing file means "start empty". Malformed content is logged and
    /// ignored.
    pub async fn load(&self) -> WorkerResult<usize> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No duration cache on disk, starting empty");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let stored: HashMap<String, serde_json::Value> = match serde_json::from_slice(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Duration cache file is malformed, starting empty"
                );
                return Ok(0);
            }
        };

        let now = Utc::now();
        let mut loaded = HashMap::with_capacity(stored.len());
        let mut skipped = 0usize;

        for (key, value) in stored {
            if !key.starts_with(KEY_PREFIX) {
                skipped += 1;
                continue;
            }
            let entry = match serde_json::from_value::<StoredEntry>(value) {
                Ok(StoredEntry::Full(entry)) => entry,
                Ok(StoredEntry::Bare(duration)) => CacheEntry {
                    duration,
                    fetched_at: now,
                },
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            if entry.duration.is_finite() && entry.duration > 0.0 {
                loaded.insert(key, entry);
            } else {
                skipped += 1;
            }
        }

        if skipped > 0 {
            warn!(skipped, "Ignored malformed duration cache entries");
        }

        let count = loaded.len();
        self.entries.write().extend(loaded);
        info!(path = %self.path.display(), entries = count, "Loaded duration cache");
        Ok(count)
    }

    /// Persist the cache. Does nothing when unchanged since the last save.
    ///
    /// Returns whether a write happened.
    pub async fn save(&self) -> WorkerResult<bool> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let snapshot: BTreeMap<String, CacheEntry> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        let result: WorkerResult<()> = async {
            let json = serde_json::to_vec_pretty(&snapshot)?;
            strmshot_media::write_atomic(&self.path, json)
                .await
                .map_err(|e| WorkerError::Cache(format!("cannot write {}: {}", self.path.display(), e)))
        }
        .await;

        if let Err(e) = result {
            // Keep the changes pending for the next attempt
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }

        debug!(path = %self.path.display(), entries = snapshot.len(), "Saved duration cache");
        Ok(true)
    }

    /// Periodically prune (when `max_age` is set) and save until `shutdown`
    /// flips to true. The caller performs the final save.
    pub fn spawn_autosave(
        self: Arc<Self>,
        every: Duration,
        max_age: Option<Duration>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(max_age) = max_age {
                            self.prune_older_than(max_age);
                        }
                        if let Err(e) = self.save().await {
                            warn!(error = %e, "Duration cache auto-save failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Duration cache auto-save stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://cdn.example.com/Heat.mkv";

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = DurationCache::new(&path);
        cache.set(URL, 10_200.5);
        assert!(cache.save().await.unwrap());

        let fresh = DurationCache::open(&path).await.unwrap();
        assert_eq!(fresh.get(URL), Some(10_200.5));
        assert!(fresh.has(URL));
        assert!(!fresh.is_dirty());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let key = format!("duration:{}", URL);
        assert_eq!(raw[key.as_str()]["duration"], 10_200.5);
        assert!(raw[key.as_str()]["fetchedAt"].is_string());
    }

    #[tokio::test]
    async fn test_save_is_noop_when_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let cache = DurationCache::new(&path);

        assert!(!cache.save().await.unwrap());
        assert!(!path.exists());

        cache.set(URL, 1.0);
        assert!(cache.save().await.unwrap());
        assert!(!cache.save().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let cache = DurationCache::open(dir.path().join("absent.json")).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = DurationCache::open(&path).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_accepts_bare_numbers_and_skips_bad_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{
                "duration:https://a/1.mkv": 120.0,
                "duration:https://a/2.mkv": {"duration": 300.0, "fetchedAt": "2024-01-01T00:00:00Z"},
                "duration:https://a/3.mkv": "soon",
                "duration:https://a/4.mkv": -1,
                "other:https://a/5.mkv": 10
            }"#,
        )
        .unwrap();

        let cache = DurationCache::new(&path);
        assert_eq!(cache.load().await.unwrap(), 2);
        assert_eq!(cache.get("https://a/1.mkv"), Some(120.0));
        assert_eq!(cache.get("https://a/2.mkv"), Some(300.0));
        assert!(!cache.has("https://a/3.mkv"));
    }

    #[test]
    fn test_prune_older_than() {
        let cache = DurationCache::new("unused.json");
        cache.insert(
            "https://a/old.mkv",
            CacheEntry {
                duration: 60.0,
                fetched_at: Utc::now() - chrono::Duration::days(40),
            },
        );
        cache.set("https://a/new.mkv", 90.0);

        assert_eq!(cache.prune_older_than(Duration::from_secs(30 * 24 * 3600)), 1);
        assert!(!cache.has("https://a/old.mkv"));
        assert!(cache.has("https://a/new.mkv"));
    }

    #[tokio::test]
    async fn test_concurrent_sets() {
        let cache = Arc::new(DurationCache::new("unused.json"));
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set(&format!("https://a/{}.mkv", i), i as f64 + 1.0);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.len(), 32);
    }

    #[tokio::test]
    async fn test_autosave_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let cache = Arc::new(DurationCache::new(&path));
        cache.set(URL, 42.0);

        let (tx, rx) = watch::channel(false);
        let task = cache.clone().spawn_autosave(Duration::from_millis(20), None, rx);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(path.exists());
        assert!(!cache.is_dirty());

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
