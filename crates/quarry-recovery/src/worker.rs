//! Shard restore worker
//!
//! Restores one shard from the backup store: fetch into a uniquely
//! suffixed staging file, verify length and checksum, publish by atomic
//! rename, and quarantine anything that fails integrity. Staging and
//! final paths must share a filesystem; rename is the publication
//! boundary.

use crate::backup::BackupStore;
use crate::stats::RecoveryStats;
use crate::storage::StorageService;
use quarry_common::checksum::xxhash64_file;
use quarry_common::{Error, MissingShard, Result, ShardId};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Check a shard file against its catalog length and optional xxHash64
///
/// A file is corrupt when its length differs from the expected size, or
/// a checksum is known and the file's xxHash64 does not match it.
pub fn is_corrupt(path: &Path, expected_size: u64, expected_hash: Option<u64>) -> Result<bool> {
    let length = fs::metadata(path)?.len();
    if length != expected_size {
        return Ok(true);
    }
    if let Some(expected) = expected_hash {
        if xxhash64_file(path)? != expected {
            return Ok(true);
        }
    }
    Ok(false)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut joined = path.as_os_str().to_os_string();
    joined.push(suffix);
    PathBuf::from(joined)
}

/// Restores single shards from the backup store
pub struct RecoveryWorker {
    storage: Arc<dyn StorageService>,
    backup: Arc<dyn BackupStore>,
    stats: Arc<RecoveryStats>,
}

impl RecoveryWorker {
    /// Create a worker over the given collaborators
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageService>,
        backup: Arc<dyn BackupStore>,
        stats: Arc<RecoveryStats>,
    ) -> Self {
        Self {
            storage,
            backup,
            stats,
        }
    }

    /// Restore one shard from backup into its final path
    ///
    /// A valid file already present is a success without touching the
    /// backup copy. An invalid file is quarantined before the restore.
    pub async fn restore_from_backup(&self, shard: &MissingShard) -> Result<()> {
        let shard_id = shard.shard_id;

        if !self.backup.exists(shard_id).await? {
            self.stats.backup_not_found.fetch_add(1, Ordering::Relaxed);
            return Err(Error::BackupNotFound { shard_id });
        }

        let final_path = self.storage.storage_path(shard_id);
        if final_path.exists() {
            // Unreadable counts as corrupt; the restore replaces it
            if !is_corrupt(&final_path, shard.size_bytes, shard.xxhash64).unwrap_or(true) {
                debug!(%shard_id, "local shard file is already valid");
                return Ok(());
            }
            warn!(%shard_id, path = %final_path.display(), "local shard file failed verification");
            self.quarantine(shard_id, &final_path);
        }

        // Unique suffix so concurrent recoveries of one shard never
        // collide on the staging path
        let staging = append_suffix(
            &self.storage.staging_path(shard_id),
            &format!(".tmp-{}", Uuid::new_v4()),
        );
        self.storage.create_parents(&staging)?;

        let started = Instant::now();
        if let Err(e) = self.backup.restore(shard_id, &staging).await {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        let restored_bytes = fs::metadata(&staging).map(|m| m.len()).unwrap_or(0);
        self.stats
            .record_restore_rate(restored_bytes, started.elapsed().as_secs_f64());

        self.storage.create_parents(&final_path)?;
        if let Err(rename_err) = fs::rename(&staging, &final_path) {
            // A concurrent recovery may have published first; the file
            // that won is verified below like any other
            if final_path.exists() {
                debug!(%shard_id, "shard file appeared concurrently during publication");
            } else {
                let _ = fs::remove_file(&staging);
                return Err(Error::recovery(format!(
                    "failed to publish shard {shard_id}: {rename_err}"
                )));
            }
        }
        let _ = fs::remove_file(&staging);

        let intact = final_path.exists()
            && !is_corrupt(&final_path, shard.size_bytes, shard.xxhash64).unwrap_or(true);
        if !intact {
            warn!(%shard_id, "restored shard file failed verification");
            self.quarantine(shard_id, &final_path);
            return Err(Error::BackupCorruption { shard_id });
        }

        info!(%shard_id, bytes = restored_bytes, "restored shard from backup");
        Ok(())
    }

    /// Move a corrupt shard file into quarantine for forensic inspection
    ///
    /// An occupied quarantine slot leaves the corrupt file in place;
    /// rename failures are logged, never propagated.
    fn quarantine(&self, shard_id: ShardId, path: &Path) {
        let quarantine = append_suffix(&self.storage.quarantine_path(shard_id), ".corrupt");
        if quarantine.exists() {
            warn!(
                %shard_id,
                quarantine = %quarantine.display(),
                "quarantine file already exists; leaving corrupt shard in place"
            );
            return;
        }
        let moved = self
            .storage
            .create_parents(&quarantine)
            .and_then(|()| fs::rename(path, &quarantine).map_err(Error::from));
        match moved {
            Ok(()) => {
                self.stats
                    .corrupt_quarantined
                    .fetch_add(1, Ordering::Relaxed);
                warn!(%shard_id, quarantine = %quarantine.display(), "quarantined corrupt shard file");
            }
            Err(e) => warn!(%shard_id, "failed to quarantine corrupt shard file: {e}"),
        }
    }
}
