//! Missing shard discovery
//!
//! A periodic loop that reconciles local shard files against the
//! catalog's assignment for this node and enqueues background-priority
//! recoveries for anything absent or size-mismatched. Checksums are not
//! consulted here; a length mismatch is the cheap indicator, and the
//! worker verifies content anyway.

use crate::manager::ManagerInner;
use quarry_common::{MissingShard, Result};
use rand::Rng;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Uniform jitter in `[1, interval)` seconds, spreading catalog load
/// across nodes; degenerate intervals pin to one second
fn discovery_jitter(interval_secs: u64) -> Duration {
    if interval_secs <= 2 {
        return Duration::from_secs(1);
    }
    Duration::from_secs(rand::thread_rng().gen_range(1..interval_secs))
}

fn local_file_matches(path: &Path, expected_len: u64) -> bool {
    fs::metadata(path).map(|m| m.len() == expected_len).unwrap_or(false)
}

/// One discovery cycle: enumerate assigned shards and enqueue the
/// missing ones. Returns how many recoveries were enqueued.
pub(crate) async fn run_discovery(inner: &ManagerInner) -> Result<usize> {
    let assigned = inner.catalog.node_shards(inner.node_id).await?;
    let mut enqueued = 0;
    for metadata in assigned {
        let path = inner.storage.storage_path(metadata.shard_id);
        if local_file_matches(&path, metadata.size_bytes) {
            continue;
        }
        debug!(shard = %metadata.shard_id, "local shard file missing or size-mismatched");
        let _ = inner.submit(MissingShard::background(metadata));
        enqueued += 1;
    }
    Ok(enqueued)
}

/// Long-running discovery task: jitter sleep, one cycle, fixed delay,
/// repeat until shutdown. Cycle failures are logged and do not stop the
/// loop.
pub(crate) async fn discovery_loop(
    inner: std::sync::Arc<ManagerInner>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval_secs = inner.config.discovery_interval_secs;
    let interval = Duration::from_secs(interval_secs);
    info!(interval_secs, "starting missing shard discovery");

    loop {
        tokio::select! {
            () = tokio::time::sleep(discovery_jitter(interval_secs)) => {}
            _ = shutdown.changed() => break,
        }

        match run_discovery(&inner).await {
            Ok(0) => {}
            Ok(enqueued) => info!(enqueued, "enqueued missing shards for recovery"),
            Err(e) => warn!("missing shard discovery failed: {e}"),
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!("missing shard discovery stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let jitter = discovery_jitter(300);
            assert!(jitter >= Duration::from_secs(1));
            assert!(jitter < Duration::from_secs(300));
        }
        assert_eq!(discovery_jitter(0), Duration::from_secs(1));
        assert_eq!(discovery_jitter(1), Duration::from_secs(1));
        assert_eq!(discovery_jitter(2), Duration::from_secs(1));
    }

    #[test]
    fn test_local_file_matches_on_length_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard");
        File::create(&path).unwrap().write_all(b"12345").unwrap();

        assert!(local_file_matches(&path, 5));
        assert!(!local_file_matches(&path, 6));
        assert!(!local_file_matches(&dir.path().join("absent"), 5));
    }
}
