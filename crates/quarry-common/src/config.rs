//! Configuration types for Quarry
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};

/// Shard recovery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Period of the missing-shard discovery loop (seconds); also the
    /// upper bound of the per-cycle jitter sleep
    pub discovery_interval_secs: u64,
    /// Maximum concurrent recovery workers
    pub recovery_threads: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: 5 * 60,
            recovery_threads: 10,
        }
    }
}

/// Merge operator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Byte threshold at which an output page is considered full
    pub max_page_bytes: usize,
    /// Row threshold at which an output page is considered full
    pub max_page_rows: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_page_bytes: 1024 * 1024, // 1 MiB
            max_page_rows: 8192,
        }
    }
}
