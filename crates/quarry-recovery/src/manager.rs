//! Shard recovery manager
//!
//! Wires the catalog, storage service, and backup store into a
//! background reconciliation service: a periodic discovery loop feeds a
//! deduplicating priority queue whose workers restore shards with atomic
//! publication. The read path requests urgent recoveries through
//! [`ShardRecoveryManager::recover_shard`].

use crate::backup::BackupStore;
use crate::catalog::ShardCatalog;
use crate::discovery;
use crate::queue::{RecoveryFuture, RecoveryQueue};
use crate::stats::RecoveryStats;
use crate::storage::StorageService;
use crate::worker::RecoveryWorker;
use parking_lot::Mutex;
use quarry_common::config::RecoveryConfig;
use quarry_common::{Error, MissingShard, NodeId, Result, ShardId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared state between the manager facade, the discovery loop, and
/// recovery jobs
pub(crate) struct ManagerInner {
    pub(crate) node_id: NodeId,
    pub(crate) catalog: Arc<dyn ShardCatalog>,
    pub(crate) storage: Arc<dyn StorageService>,
    /// Present only when a backup store is configured
    pub(crate) worker: Option<Arc<RecoveryWorker>>,
    pub(crate) queue: RecoveryQueue,
    pub(crate) stats: Arc<RecoveryStats>,
    pub(crate) config: RecoveryConfig,
}

impl ManagerInner {
    /// Enqueue one recovery, collapsing onto an outstanding job for the
    /// same `(shard_id, active)` key
    pub(crate) fn submit(&self, shard: MissingShard) -> RecoveryFuture {
        let Some(worker) = self.worker.as_ref().map(Arc::clone) else {
            return crate::queue::failed_future(Error::recovery(
                "no backup store configured; shard recovery is disabled",
            ));
        };
        let stats = Arc::clone(&self.stats);
        self.queue.submit(shard, async move {
            let result = worker.restore_from_backup(&shard).await;
            stats.record_outcome(shard.active, result.is_ok());
            result
        })
    }
}

/// Background service keeping local shard files converged with the
/// catalog
pub struct ShardRecoveryManager {
    inner: Arc<ManagerInner>,
    shutdown_tx: watch::Sender<bool>,
    discovery_task: Mutex<Option<JoinHandle<()>>>,
}

impl ShardRecoveryManager {
    /// Wire a manager; workers are spawned immediately, the discovery
    /// loop waits for [`start`](Self::start)
    ///
    /// Must be called within a tokio runtime. Without a backup store the
    /// manager is inert: discovery does not start and submissions fail.
    #[must_use]
    pub fn new(
        node_id: NodeId,
        catalog: Arc<dyn ShardCatalog>,
        storage: Arc<dyn StorageService>,
        backup: Option<Arc<dyn BackupStore>>,
        config: RecoveryConfig,
    ) -> Self {
        let stats = Arc::new(RecoveryStats::default());
        let worker = backup.map(|backup| {
            Arc::new(RecoveryWorker::new(
                Arc::clone(&storage),
                backup,
                Arc::clone(&stats),
            ))
        });
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerInner {
                node_id,
                catalog,
                storage,
                worker,
                queue: RecoveryQueue::new(config.recovery_threads),
                stats,
                config,
            }),
            shutdown_tx,
            discovery_task: Mutex::new(None),
        }
    }

    /// Start the periodic discovery loop
    pub fn start(&self) {
        if self.inner.worker.is_none() {
            warn!("backup store not configured; missing shard discovery disabled");
            return;
        }
        let mut task = self.discovery_task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(tokio::spawn(discovery::discovery_loop(
            Arc::clone(&self.inner),
            self.shutdown_tx.subscribe(),
        )));
    }

    /// Run one discovery cycle immediately; returns how many recoveries
    /// were enqueued
    pub async fn discover_missing_shards(&self) -> Result<usize> {
        discovery::run_discovery(&self.inner).await
    }

    /// Enqueue a recovery request directly
    pub fn submit(&self, shard: MissingShard) -> RecoveryFuture {
        self.inner.submit(shard)
    }

    /// Recover one shard at active priority and wait for completion
    ///
    /// Fails with [`Error::ShardUnknown`] when the catalog has no record
    /// of the shard.
    pub async fn recover_shard(&self, shard_id: ShardId) -> Result<()> {
        let metadata = self
            .inner
            .catalog
            .shard(shard_id)
            .await?
            .ok_or(Error::ShardUnknown { shard_id })?;
        self.inner
            .submit(MissingShard::active(metadata))
            .await
            .map_err(Error::from)
    }

    /// Recovery statistics
    #[must_use]
    pub fn stats(&self) -> Arc<RecoveryStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Stop discovery and the worker pool
    ///
    /// In-flight restores are abandoned and may leave staging files
    /// behind; the next discovery cycle after a restart reconverges.
    pub fn shutdown(&self) {
        if let Some(task) = self.discovery_task.lock().take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
        self.inner.queue.shutdown();
        info!("shard recovery manager stopped");
    }
}

impl Drop for ShardRecoveryManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
