//! Batch orchestrator.
//!
//! Turns a list of identifiers into queue submissions and a single ordered
//! event stream: per-job log lines, a `failed` event per failure, a full
//! progress snapshot after every settlement and exactly one `complete`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use metrics::{counter, histogram};
use strmshot_models::{BatchEvent, BatchOptions, BatchProgress, JobOutcome};
use strmshot_queue::{TaskError, TaskQueue};
use tracing::{info, warn, Instrument};
use validator::Validate;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::processor::JobProcessor;
use crate::sink::EventSink;

/// Final accounting for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub progress: BatchProgress,
    pub failed_identifiers: Vec<String>,
    pub concurrency: usize,
    pub elapsed: Duration,
}

/// Pick the concurrency for a batch of `batch_size` jobs.
///
/// Small batches are clamped down to `min_concurrency`; large batches may
/// scale up by `large_batch_multiplier`. The result never exceeds
/// `max_concurrency`.
pub fn resolve_concurrency(requested: Option<usize>, batch_size: usize, config: &WorkerConfig) -> usize {
    let base = requested.unwrap_or(config.default_concurrency).max(1);

    let scaled = if batch_size < config.small_batch_threshold {
        base.min(config.min_concurrency)
    } else if batch_size > config.large_batch_threshold {
        base.saturating_mul(config.large_batch_multiplier)
    } else {
        base
    };

    scaled.clamp(1, config.max_concurrency.max(1))
}

/// Runs batches on a shared queue.
pub struct BatchRunner {
    queue: TaskQueue,
    processor: Arc<JobProcessor>,
    config: Arc<WorkerConfig>,
}

impl BatchRunner {
    pub fn new(queue: TaskQueue, processor: Arc<JobProcessor>, config: Arc<WorkerConfig>) -> Self {
        Self {
            queue,
            processor,
            config,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn processor(&self) -> &Arc<JobProcessor> {
        &self.processor
    }

    /// Run every identifier through the pipeline, streaming events to `sink`.
    ///
    /// Invalid options are returned as `Err` before any event is emitted.
    /// Otherwise the stream always ends with one `complete` event, however
    /// many jobs failed.
    pub async fn run_batch(
        &self,
        identifiers: Vec<String>,
        options: BatchOptions,
        sink: Arc<dyn EventSink>,
    ) -> WorkerResult<BatchSummary> {
        options.validate()?;

        let started = Instant::now();
        let total = identifiers.len();
        let mut progress = BatchProgress::new(total);
        let mut failed_identifiers = Vec::new();

        if total == 0 {
            sink.emit(BatchEvent::complete(progress, failed_identifiers.clone()));
            return Ok(BatchSummary {
                progress,
                failed_identifiers,
                concurrency: 0,
                elapsed: started.elapsed(),
            });
        }

        let concurrency = resolve_concurrency(options.concurrency, total, &self.config);
        // The queue is shared: the most recent batch sets the ceiling
        self.queue.configure(concurrency)?;

        info!(total, concurrency, "Starting batch");
        counter!("strmshot_batches_total").increment(1);
        sink.emit(BatchEvent::info(format!(
            "Processing {} file(s) with concurrency {}",
            total, concurrency
        )));

        let options = Arc::new(options);
        let mut pending = FuturesUnordered::new();

        for identifier in identifiers {
            let processor = self.processor.clone();
            let options = options.clone();
            let job_sink = sink.clone();
            let job_id = identifier.clone();

            let handle = self.queue.submit(move || {
                let log = JobLogger::new(&job_id, "thumbnail", job_sink);
                let span = log.create_span();
                async move {
                    match processor.process(&job_id, &options, &log).await {
                        JobOutcome::Failed { reason } => Err(reason),
                        outcome => Ok(outcome),
                    }
                }
                .instrument(span)
            });

            pending.push(async move { (identifier, handle.await) });
        }

        while let Some((identifier, result)) = pending.next().await {
            let log = JobLogger::new(&identifier, "thumbnail", sink.clone());

            let failure = match result {
                Ok(JobOutcome::Succeeded { details }) => {
                    progress.record_success();
                    counter!("strmshot_jobs_total", "outcome" => "succeeded").increment(1);
                    log.success(&format!(
                        "thumbnail created at {:.1}s{}",
                        details.offset,
                        if details.cache_hit { " (cached duration)" } else { "" }
                    ));
                    None
                }
                Ok(JobOutcome::Skipped { reason }) => {
                    progress.record_success();
                    counter!("strmshot_jobs_total", "outcome" => "skipped").increment(1);
                    log.info(&format!("skipped ({})", reason));
                    None
                }
                Ok(JobOutcome::Failed { reason }) | Err(TaskError::Failed(reason)) => Some(reason),
                Err(e) => Some(e.to_string()),
            };

            if let Some(reason) = failure {
                progress.record_failure();
                counter!("strmshot_jobs_total", "outcome" => "failed").increment(1);
                log.error(&reason);
                sink.emit(BatchEvent::failed(identifier.clone()));
                failed_identifiers.push(identifier);
            }

            sink.emit(BatchEvent::progress(progress));
        }

        let elapsed = started.elapsed();
        histogram!("strmshot_batch_duration_seconds").record(elapsed.as_secs_f64());

        if progress.failed > 0 {
            warn!(
                total,
                failed = progress.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "Batch finished with failures"
            );
        } else {
            info!(total, elapsed_ms = elapsed.as_millis() as u64, "Batch finished");
        }

        sink.emit(BatchEvent::complete(progress, failed_identifiers.clone()));

        Ok(BatchSummary {
            progress,
            failed_identifiers,
            concurrency,
            elapsed,
        })
    }

    /// Re-run previously failed identifiers as a new batch.
    ///
    /// The duration cache is left as is; sources that failed before probing
    /// are probed again, sources whose duration was cached reuse it.
    pub async fn retry_failed(
        &self,
        failed_identifiers: Vec<String>,
        options: BatchOptions,
        sink: Arc<dyn EventSink>,
    ) -> WorkerResult<BatchSummary> {
        info!(count = failed_identifiers.len(), "Retrying failed files");
        self.run_batch(failed_identifiers, options, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration_cache::DurationCache;
    use crate::testing::{write_strm, CollectingSink, FakeBackend};
    use std::sync::atomic::Ordering;
    use strmshot_models::{LogLevel, ThumbnailPosition};
    use tempfile::TempDir;

    fn runner(backend: Arc<FakeBackend>, dir: &TempDir) -> BatchRunner {
        let config = Arc::new(WorkerConfig {
            work_dir: dir.path().join("work"),
            ..Default::default()
        });
        let cache = Arc::new(DurationCache::new(dir.path().join("cache.json")));
        let processor = Arc::new(JobProcessor::new(backend, cache, config.clone()));
        BatchRunner::new(TaskQueue::new(config.default_concurrency).unwrap(), processor, config)
    }

    fn count_level(events: &[BatchEvent], wanted: LogLevel) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Log { level, .. } if *level == wanted))
            .count()
    }

    #[test]
    fn test_resolve_concurrency() {
        let config = WorkerConfig::default();

        assert_eq!(resolve_concurrency(None, 3, &config), 2);
        assert_eq!(resolve_concurrency(Some(1), 3, &config), 1);
        assert_eq!(resolve_concurrency(None, 50, &config), 4);
        assert_eq!(resolve_concurrency(Some(6), 50, &config), 6);
        assert_eq!(resolve_concurrency(None, 500, &config), 8);
        assert_eq!(resolve_concurrency(Some(12), 500, &config), 16);
        assert_eq!(resolve_concurrency(Some(64), 50, &config), 16);
    }

    #[tokio::test]
    async fn test_mixed_batch_scenario() {
        let dir = TempDir::new().unwrap();
        let good_a = write_strm(dir.path(), "A", "https://cdn.example.com/a.mkv");
        let good_b = write_strm(dir.path(), "B", "https://cdn.example.com/b.mkv");
        let bad = write_strm(dir.path(), "C", "https://cdn.example.com/c.mkv");

        let backend = Arc::new(
            FakeBackend::new()
                .with_duration("https://cdn.example.com/a.mkv", 120.0)
                .with_duration("https://cdn.example.com/b.mkv", 300.0)
                .unreachable("https://cdn.example.com/c.mkv"),
        );
        let runner = runner(backend, &dir);
        let sink = Arc::new(CollectingSink::default());

        let options = BatchOptions {
            position: ThumbnailPosition::Middle,
            ..Default::default()
        };
        let summary = runner
            .run_batch(vec![good_a, good_b, bad.clone()], options, sink.clone())
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(count_level(&events, LogLevel::Success), 2);
        assert_eq!(count_level(&events, LogLevel::Error), 1);
        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::Log { level: LogLevel::Success, message, .. }
                if message == "A.strm: thumbnail created at 60.0s"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::Log { level: LogLevel::Error, message, .. } if message.starts_with("C.strm: ")
        )));

        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Failed { identifier } => Some(identifier.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![bad.clone()]);

        let snapshots: Vec<BatchProgress> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { progress } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 3);
        for snapshot in &snapshots {
            assert_eq!(snapshot.processed, snapshot.succeeded + snapshot.failed);
            assert!(snapshot.processed <= snapshot.total);
        }
        let last = *snapshots.last().unwrap();
        assert_eq!(
            last,
            BatchProgress {
                total: 3,
                processed: 3,
                succeeded: 2,
                failed: 1
            }
        );

        let completes: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(completes.len(), 1);
        assert!(events.last().unwrap().is_terminal());
        match completes[0] {
            BatchEvent::Complete {
                progress,
                failed_identifiers,
            } => {
                assert_eq!(*progress, last);
                assert_eq!(failed_identifiers, &vec![bad]);
            }
            _ => unreachable!(),
        }

        assert_eq!(summary.concurrency, 2);
        assert_eq!(summary.progress, last);
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let dir = TempDir::new().unwrap();
        let runner = runner(Arc::new(FakeBackend::new()), &dir);
        let sink = Arc::new(CollectingSink::default());

        runner
            .run_batch(Vec::new(), BatchOptions::default(), sink.clone())
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            BatchEvent::complete(BatchProgress::new(0), Vec::new())
        );
    }

    #[tokio::test]
    async fn test_all_failed_still_completes() {
        let dir = TempDir::new().unwrap();
        let ids: Vec<_> = (0..4)
            .map(|i| write_strm(dir.path(), &format!("L{}", i), "http://127.0.0.1/x.mkv"))
            .collect();
        let runner = runner(Arc::new(FakeBackend::new()), &dir);
        let sink = Arc::new(CollectingSink::default());

        let summary = runner
            .run_batch(ids.clone(), BatchOptions::default(), sink.clone())
            .await
            .unwrap();

        assert_eq!(summary.progress.failed, 4);
        assert_eq!(summary.progress.processed, 4);
        let mut failed = summary.failed_identifiers.clone();
        failed.sort();
        assert_eq!(failed, ids);
        assert!(sink.events().last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_streaming() {
        let dir = TempDir::new().unwrap();
        let runner = runner(Arc::new(FakeBackend::new()), &dir);
        let sink = Arc::new(CollectingSink::default());

        let options = BatchOptions {
            quality: 0,
            ..Default::default()
        };
        let result = runner
            .run_batch(vec!["/m/a.strm".to_string()], options, sink.clone())
            .await;

        assert!(result.unwrap_err().is_configuration());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_counts_as_success() {
        let dir = TempDir::new().unwrap();
        let id = write_strm(dir.path(), "Done", "https://cdn.example.com/done.mkv");
        std::fs::write(dir.path().join("Done-thumb.jpg"), vec![1u8; 2048]).unwrap();
        let backend = Arc::new(FakeBackend::new());
        let runner = runner(backend.clone(), &dir);
        let sink = Arc::new(CollectingSink::default());

        let summary = runner
            .run_batch(vec![id], BatchOptions::default(), sink.clone())
            .await
            .unwrap();

        assert_eq!(summary.progress.succeeded, 1);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            BatchEvent::Log { message, .. } if message.contains("skipped")
        )));
        assert_eq!(backend.reachability_checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_reuses_cache() {
        let dir = TempDir::new().unwrap();
        let id = write_strm(dir.path(), "Flaky", "https://cdn.example.com/flaky.mkv");
        let backend = Arc::new(FakeBackend::new().with_duration("https://cdn.example.com/flaky.mkv", 60.0));
        let runner = runner(backend.clone(), &dir);
        runner
            .processor()
            .cache()
            .set("https://cdn.example.com/flaky.mkv", 60.0);

        let summary = runner
            .retry_failed(vec![id], BatchOptions::default(), Arc::new(CollectingSink::default()))
            .await
            .unwrap();

        assert_eq!(summary.progress.succeeded, 1);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 0);
    }
}
