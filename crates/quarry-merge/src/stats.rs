//! Merge operator statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for network input consumed and output emitted by one
/// merge operator
#[derive(Debug, Default)]
pub struct OperatorStats {
    pub input_pages: AtomicU64,
    pub input_bytes: AtomicU64,
    pub input_rows: AtomicU64,
    pub output_pages: AtomicU64,
    pub output_bytes: AtomicU64,
    pub output_rows: AtomicU64,
}

impl OperatorStats {
    /// Record one page of network input
    pub fn record_input(&self, bytes: u64, rows: u64) {
        self.input_pages.fetch_add(1, Ordering::Relaxed);
        self.input_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.input_rows.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record one emitted output page
    pub fn record_output(&self, bytes: u64, rows: u64) {
        self.output_pages.fetch_add(1, Ordering::Relaxed);
        self.output_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.output_rows.fetch_add(rows, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counters() {
        let stats = OperatorStats::default();
        stats.record_input(128, 10);
        stats.record_input(64, 5);
        stats.record_output(96, 15);

        assert_eq!(stats.input_pages.load(Ordering::Relaxed), 2);
        assert_eq!(stats.input_bytes.load(Ordering::Relaxed), 192);
        assert_eq!(stats.input_rows.load(Ordering::Relaxed), 15);
        assert_eq!(stats.output_pages.load(Ordering::Relaxed), 1);
        assert_eq!(stats.output_rows.load(Ordering::Relaxed), 15);
    }
}
