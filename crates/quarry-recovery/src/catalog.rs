//! Shard catalog collaborator
//!
//! The catalog is the cluster's authoritative record of which shards
//! exist and which node owns them. Recovery consults it; it never
//! mutates it.

use async_trait::async_trait;
use parking_lot::RwLock;
use quarry_common::{NodeId, Result, ShardId, ShardMetadata};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Read access to the authoritative shard catalog
#[async_trait]
pub trait ShardCatalog: Send + Sync {
    /// All shards assigned to `node_id`
    async fn node_shards(&self, node_id: NodeId) -> Result<Vec<ShardMetadata>>;

    /// Metadata for one shard, or `None` when the catalog has no record
    async fn shard(&self, shard_id: ShardId) -> Result<Option<ShardMetadata>>;
}

/// Catalog held entirely in memory
///
/// Suitable for single-node deployments and tests; clustered deployments
/// implement [`ShardCatalog`] against the metadata service.
#[derive(Debug, Default)]
pub struct InMemoryShardCatalog {
    assignments: RwLock<HashMap<NodeId, Vec<ShardMetadata>>>,
    shards: RwLock<HashMap<ShardId, ShardMetadata>>,
    lookups: AtomicU64,
}

impl InMemoryShardCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a shard as assigned to a node
    pub fn assign(&self, node_id: NodeId, metadata: ShardMetadata) {
        self.assignments
            .write()
            .entry(node_id)
            .or_default()
            .push(metadata);
        self.shards.write().insert(metadata.shard_id, metadata);
    }

    /// Number of single-shard lookups served
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ShardCatalog for InMemoryShardCatalog {
    async fn node_shards(&self, node_id: NodeId) -> Result<Vec<ShardMetadata>> {
        Ok(self
            .assignments
            .read()
            .get(&node_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn shard(&self, shard_id: ShardId) -> Result<Option<ShardMetadata>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.shards.read().get(&shard_id).copied())
    }
}
