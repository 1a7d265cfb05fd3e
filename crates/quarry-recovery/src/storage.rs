//! Storage path resolution
//!
//! The storage service maps a shard to its three local paths: the final
//! storage location, the staging area used as the atomic-rename source,
//! and the quarantine area for files that fail integrity checks. All
//! three must live on one filesystem so that rename-based publication
//! stays atomic.

use quarry_common::{Result, ShardId};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves local paths for shard files
pub trait StorageService: Send + Sync {
    /// Final path of a shard file
    fn storage_path(&self, shard_id: ShardId) -> PathBuf;

    /// Base staging path of a shard; recoveries add a unique suffix
    fn staging_path(&self, shard_id: ShardId) -> PathBuf;

    /// Base quarantine path of a shard
    fn quarantine_path(&self, shard_id: ShardId) -> PathBuf;

    /// Create the parent directories of `path`
    fn create_parents(&self, path: &Path) -> Result<()>;
}

/// Storage layout with one directory per role under a common root
#[derive(Clone, Debug)]
pub struct FlatStorageService {
    root: PathBuf,
}

impl FlatStorageService {
    /// Create a layout rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StorageService for FlatStorageService {
    fn storage_path(&self, shard_id: ShardId) -> PathBuf {
        self.root.join("storage").join(shard_id.to_string())
    }

    fn staging_path(&self, shard_id: ShardId) -> PathBuf {
        self.root.join("staging").join(shard_id.to_string())
    }

    fn quarantine_path(&self, shard_id: ShardId) -> PathBuf {
        self.root.join("quarantine").join(shard_id.to_string())
    }

    fn create_parents(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
