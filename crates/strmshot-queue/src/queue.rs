//! Bounded task queue.
//!
//! Jobs either get a slot immediately or park as a waiter in a priority heap.
//! When a slot is released the next waiter is handed a slot under the same
//! lock that decremented the running counter, so a freed slot is never
//! advertised twice and never left empty while someone is waiting.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult, TaskError};

/// Cumulative counters since creation or the last [`TaskQueue::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
}

/// Consistent snapshot of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub running: usize,
    pub queued: usize,
    pub concurrency_limit: usize,
    pub stats: QueueStats,
}

struct Waiter {
    priority: i32,
    seq: u64,
    tx: oneshot::Sender<Slot>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Max-heap: higher priority first, then the earliest arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    limit: usize,
    running: usize,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,
    stats: QueueStats,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.running == 0 && self.waiters.is_empty()
    }
}

struct Inner {
    state: Mutex<QueueState>,
    idle: Notify,
}

impl Inner {
    /// Hand free slots to waiters, highest priority first.
    ///
    /// Must be called with the state lock held.
    fn dispatch(self: &Arc<Self>, state: &mut QueueState) {
        while state.running < state.limit {
            let Some(waiter) = state.waiters.pop() else {
                break;
            };

            state.running += 1;
            if let Err(mut slot) = waiter.tx.send(Slot::new(self.clone())) {
                // Receiver went away (task aborted); reclaim the slot
                slot.armed = false;
                state.running -= 1;
            }
        }
    }

    fn settle(self: &Arc<Self>, ok: bool) {
        let idle = {
            let mut state = self.state.lock();
            if ok {
                state.stats.completed += 1;
            } else {
                state.stats.failed += 1;
            }
            state.running -= 1;
            self.dispatch(&mut state);
            state.is_idle()
        };

        if idle {
            self.idle.notify_waiters();
        }
    }
}

/// Permission to run one job. Releasing it starts the next waiter.
struct Slot {
    inner: Arc<Inner>,
    armed: bool,
}

impl Slot {
    fn new(inner: Arc<Inner>) -> Self {
        Self { inner, armed: true }
    }

    fn release(mut self, ok: bool) {
        self.armed = false;
        self.inner.settle(ok);
    }
}

impl Drop for Slot {
    // Reached when the job panics or its task is cancelled mid-run.
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.inner.settle(false);
        }
    }
}

enum Acquire {
    Ready(Slot),
    Waiting(oneshot::Receiver<Slot>),
}

/// Bounded-concurrency task queue.
///
/// Cheap to clone; clones share the same slots and counters.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("status", &self.status())
            .finish()
    }
}

impl TaskQueue {
    /// Create a queue that runs at most `limit` jobs at once.
    pub fn new(limit: usize) -> QueueResult<Self> {
        if limit < 1 {
            return Err(QueueError::InvalidConcurrency(limit));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    limit,
                    running: 0,
                    waiters: BinaryHeap::new(),
                    next_seq: 0,
                    stats: QueueStats::default(),
                }),
                idle: Notify::new(),
            }),
        })
    }

    /// Change the concurrency ceiling.
    ///
    /// Running jobs are never interrupted; lowering the limit only delays new
    /// starts, raising it starts waiters immediately.
    pub fn configure(&self, limit: usize) -> QueueResult<()> {
        if limit < 1 {
            return Err(QueueError::InvalidConcurrency(limit));
        }

        let mut state = self.inner.state.lock();
        if state.limit != limit {
            info!(from = state.limit, to = limit, "Queue concurrency changed");
        }
        state.limit = limit;
        self.inner.dispatch(&mut state);
        Ok(())
    }

    /// Current concurrency ceiling.
    pub fn concurrency_limit(&self) -> usize {
        self.inner.state.lock().limit
    }

    /// Submit a job at default priority.
    pub fn submit<F, Fut, T, E>(&self, job: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit_with_priority(0, job)
    }

    /// Submit a job. Higher `priority` starts first; equal priorities start
    /// in arrival order.
    ///
    /// The returned handle resolves exactly once with the job's own result.
    /// The queue never retries or rewrites job errors.
    pub fn submit_with_priority<F, Fut, T, E>(&self, priority: i32, job: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let acquire = self.acquire(priority);

        let handle = tokio::spawn(async move {
            let slot = match acquire {
                Acquire::Ready(slot) => slot,
                Acquire::Waiting(rx) => match rx.await {
                    Ok(slot) => slot,
                    Err(_) => return Err(TaskError::Discarded),
                },
            };

            // A panic unwinds through `slot`, whose Drop records the failure
            let result = job().await;
            slot.release(result.is_ok());
            result.map_err(TaskError::Failed)
        });

        TaskHandle { handle }
    }

    fn acquire(&self, priority: i32) -> Acquire {
        let mut state = self.inner.state.lock();
        state.stats.submitted += 1;

        if state.running < state.limit && state.waiters.is_empty() {
            state.running += 1;
            return Acquire::Ready(Slot::new(self.inner.clone()));
        }

        let (tx, rx) = oneshot::channel();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.waiters.push(Waiter { priority, seq, tx });
        self.inner.dispatch(&mut state);

        debug!(
            priority,
            queued = state.waiters.len(),
            running = state.running,
            "Job queued"
        );
        Acquire::Waiting(rx)
    }

    /// Point-in-time snapshot.
    pub fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        QueueStatus {
            running: state.running,
            queued: state.waiters.len(),
            concurrency_limit: state.limit,
            stats: state.stats,
        }
    }

    /// Wait until nothing is running or queued. Outstanding jobs are not
    /// cancelled.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed
            notified.as_mut().enable();

            if self.inner.state.lock().is_idle() {
                return;
            }

            notified.await;
        }
    }

    /// Discard every job that has not started. Returns how many were removed.
    ///
    /// Their handles resolve with [`TaskError::Discarded`]; running jobs are
    /// unaffected.
    pub fn clear(&self) -> usize {
        let (discarded, idle) = {
            let mut state = self.inner.state.lock();
            let discarded: Vec<Waiter> = state.waiters.drain().collect();
            state.stats.discarded += discarded.len() as u64;
            (discarded, state.is_idle())
        };

        let count = discarded.len();
        // Dropping the senders wakes each waiting task with Discarded
        drop(discarded);

        if count > 0 {
            warn!(count, "Discarded queued jobs");
        }
        if idle {
            self.inner.idle.notify_waiters();
        }
        count
    }

    /// Zero the cumulative counters.
    pub fn reset_stats(&self) {
        self.inner.state.lock().stats = QueueStats::default();
    }
}

/// Handle to a submitted job; resolves with the job's result.
///
/// Dropping the handle does not cancel the job.
pub struct TaskHandle<T, E> {
    handle: JoinHandle<Result<T, TaskError<E>>>,
}

impl<T, E> fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(TaskError::Cancelled),
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
