//! Recovery statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for shard recovery outcomes
#[derive(Debug, Default)]
pub struct RecoveryStats {
    pub background_success: AtomicU64,
    pub background_failure: AtomicU64,
    pub active_success: AtomicU64,
    pub active_failure: AtomicU64,
    pub backup_not_found: AtomicU64,
    pub corrupt_quarantined: AtomicU64,
    /// Last observed restore rate in bytes per second
    pub restore_rate_bps: AtomicU64,
}

impl RecoveryStats {
    /// Record the outcome of one recovery job
    pub fn record_outcome(&self, active: bool, success: bool) {
        let counter = match (active, success) {
            (true, true) => &self.active_success,
            (true, false) => &self.active_failure,
            (false, true) => &self.background_success,
            (false, false) => &self.background_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the data rate of one restore
    ///
    /// Zero-duration restores would divide to infinity; those report a
    /// rate of zero instead.
    pub fn record_restore_rate(&self, bytes: u64, elapsed_secs: f64) {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rate = {
            let raw = bytes as f64 / elapsed_secs;
            if raw.is_finite() && raw >= 0.0 { raw as u64 } else { 0 }
        };
        self.restore_rate_bps.store(rate, Ordering::Relaxed);
    }
}
