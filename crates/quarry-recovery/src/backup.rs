//! Backup store collaborator
//!
//! The backup store holds a durable copy of every shard. Recovery only
//! needs two operations from it; the physical medium behind them is the
//! implementation's business.

use async_trait::async_trait;
use quarry_common::{Error, Result, ShardId};
use std::fs;
use std::path::{Path, PathBuf};

/// Durable off-node copies of shard files
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Whether the backup holds a copy of `shard_id`
    async fn exists(&self, shard_id: ShardId) -> Result<bool>;

    /// Copy the shard into `destination`
    async fn restore(&self, shard_id: ShardId, destination: &Path) -> Result<()>;
}

/// Backup store over a local directory tree
///
/// One file per shard, named by its UUID. Suitable for single-node
/// deployments and tests.
#[derive(Clone, Debug)]
pub struct FsBackupStore {
    root: PathBuf,
}

impl FsBackupStore {
    /// Create a store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn backup_path(&self, shard_id: ShardId) -> PathBuf {
        self.root.join(shard_id.to_string())
    }

    /// Write a shard copy into the store
    pub fn put(&self, shard_id: ShardId, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.backup_path(shard_id), data)?;
        Ok(())
    }
}

#[async_trait]
impl BackupStore for FsBackupStore {
    async fn exists(&self, shard_id: ShardId) -> Result<bool> {
        Ok(self.backup_path(shard_id).exists())
    }

    async fn restore(&self, shard_id: ShardId, destination: &Path) -> Result<()> {
        let source = self.backup_path(shard_id);
        if !source.exists() {
            return Err(Error::BackupNotFound { shard_id });
        }
        fs::copy(&source, destination)?;
        Ok(())
    }
}
