//! Deduplicating priority queue for recovery jobs
//!
//! At most one job is in flight per distinct `(shard_id, active)` key;
//! repeated submissions while a job is outstanding clone the same shared
//! future. Completed keys are evicted so a later submission starts a
//! fresh job. Workers drain a priority heap ordered active-first, then
//! FIFO by submission sequence.
//!
//! There is a window where a new submission lands after a job finished
//! its work but before eviction ran; the caller then receives the
//! completing future. That is safe: publication is atomic and
//! re-verification of an intact shard file is a no-op.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use quarry_common::{Error, MissingShard, Result};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Clonable error carried by shared recovery futures
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct JobError(pub Arc<Error>);

impl From<JobError> for Error {
    fn from(e: JobError) -> Self {
        match e.0.as_ref() {
            Self::BackupNotFound { shard_id } => Self::BackupNotFound {
                shard_id: *shard_id,
            },
            Self::BackupCorruption { shard_id } => Self::BackupCorruption {
                shard_id: *shard_id,
            },
            Self::ShardUnknown { shard_id } => Self::ShardUnknown {
                shard_id: *shard_id,
            },
            other => Self::recovery(other.to_string()),
        }
    }
}

/// Outcome of one recovery job
pub type JobResult = std::result::Result<(), JobError>;

/// Shared handle on a pending or completed recovery job
pub type RecoveryFuture = Shared<BoxFuture<'static, JobResult>>;

/// A recovery future that already failed with `error`
#[must_use]
pub fn failed_future(error: Error) -> RecoveryFuture {
    futures::future::ready(Err(JobError(Arc::new(error))))
        .boxed()
        .shared()
}

/// One queued job; ordering is active-first, then FIFO
struct QueuedJob {
    active: bool,
    seq: u64,
    work: BoxFuture<'static, ()>,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.active == other.active && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: active beats background, then earlier sequence wins
        self.active
            .cmp(&other.active)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Work heap shared between submitters and workers
struct JobQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    shutdown: AtomicBool,
}

impl JobQueue {
    fn push(&self, job: QueuedJob) {
        self.heap.lock().push(job);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<QueuedJob> {
        self.heap.lock().pop()
    }
}

async fn worker_loop(queue: Arc<JobQueue>) {
    loop {
        let notified = queue.notify.notified();
        if queue.shutdown.load(Ordering::Acquire) {
            break;
        }
        if let Some(job) = queue.pop() {
            job.work.await;
            continue;
        }
        notified.await;
    }
}

/// Keyed in-flight registry over a bounded prioritized worker pool
pub struct RecoveryQueue {
    inflight: Arc<DashMap<MissingShard, RecoveryFuture>>,
    queue: Arc<JobQueue>,
    seq: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RecoveryQueue {
    /// Create a queue drained by `recovery_threads` concurrent workers
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(recovery_threads: usize) -> Self {
        let queue = Arc::new(JobQueue {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        });
        let workers = (0..recovery_threads.max(1))
            .map(|_| tokio::spawn(worker_loop(Arc::clone(&queue))))
            .collect();
        Self {
            inflight: Arc::new(DashMap::new()),
            queue,
            seq: AtomicU64::new(0),
            workers: Mutex::new(workers),
        }
    }

    /// Submit `work` for `shard`, collapsing onto an outstanding job for
    /// the same key if one exists
    pub fn submit<F>(&self, shard: MissingShard, work: F) -> RecoveryFuture
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.queue.shutdown.load(Ordering::Acquire) {
            return failed_future(Error::recovery("recovery queue is shut down"));
        }

        let (job, future) = match self.inflight.entry(shard) {
            Entry::Occupied(entry) => return entry.get().clone(),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel::<JobResult>();
                let future: RecoveryFuture = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(JobError(Arc::new(Error::recovery(
                            "recovery job aborted before completion",
                        ))))
                    })
                }
                .boxed()
                .shared();

                let inflight = Arc::clone(&self.inflight);
                let work = async move {
                    let result = work.await.map_err(|e| JobError(Arc::new(e)));
                    // Evict before completing the future so a submit that
                    // observes the completed future cannot find a stale entry
                    inflight.remove(&shard);
                    let _ = tx.send(result);
                }
                .boxed();

                entry.insert(future.clone());
                let job = QueuedJob {
                    active: shard.active,
                    seq: self.seq.fetch_add(1, Ordering::Relaxed),
                    work,
                };
                (job, future)
            }
        };

        self.queue.push(job);
        debug!(shard = %shard.shard_id, active = shard.active, "queued shard recovery");
        future
    }

    /// Number of keys with an outstanding job
    #[must_use]
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// Number of jobs waiting for a worker
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.heap.lock().len()
    }

    /// Stop the workers, abandoning queued and in-flight jobs
    pub fn shutdown(&self) {
        self.queue.shutdown.store(true, Ordering::Release);
        self.queue.notify.notify_waiters();
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
        // Dropping queued jobs drops their completion senders, failing
        // any futures still held by callers
        self.queue.heap.lock().clear();
        self.inflight.clear();
    }
}

impl Drop for RecoveryQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
