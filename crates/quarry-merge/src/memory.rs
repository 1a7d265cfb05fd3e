//! User-memory accounting for the merge pipeline
//!
//! Every page retained by the merge engine reports its byte footprint
//! here; releasing a consumed page decrements the reservation. After a
//! full drain and close the reservation returns to zero.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared byte-reservation counter
#[derive(Debug, Default)]
pub struct MemoryContext {
    reserved: AtomicU64,
}

impl MemoryContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `bytes` of user memory
    pub fn reserve(&self, bytes: u64) {
        self.reserved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Release `bytes` of user memory
    ///
    /// Releases are clamped at zero; an unmatched release indicates a
    /// bookkeeping bug upstream and must not underflow the counter.
    pub fn release(&self, bytes: u64) {
        let mut current = self.reserved.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Currently reserved bytes
    #[must_use]
    pub fn reserved_bytes(&self) -> u64 {
        self.reserved.load(Ordering::Relaxed)
    }
}
