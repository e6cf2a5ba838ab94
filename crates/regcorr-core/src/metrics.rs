//! Process-wide atomic counters for regression runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    pairs_correlated: AtomicU64,
    pairs_failed: AtomicU64,
    checkpoint_hits: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            pairs_correlated: AtomicU64::new(0),
            pairs_failed: AtomicU64::new(0),
            checkpoint_hits: AtomicU64::new(0),
        }
    }

    /// A pair produced a success or sub-optimal outcome.
    pub fn inc_pairs_correlated(&self) {
        self.pairs_correlated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pairs_correlated", "counter incremented");
    }

    /// A pair produced an error outcome.
    pub fn inc_pairs_failed(&self) {
        self.pairs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pairs_failed", "counter incremented");
    }

    /// A stage was loaded from its checkpoint instead of recomputed.
    pub fn inc_checkpoint_hits(&self) {
        self.checkpoint_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checkpoint_hits", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            pairs_correlated = self.pairs_correlated(),
            pairs_failed = self.pairs_failed(),
            checkpoint_hits = self.checkpoint_hits(),
        );
    }

    pub fn pairs_correlated(&self) -> u64 {
        self.pairs_correlated.load(Ordering::Relaxed)
    }

    pub fn pairs_failed(&self) -> u64 {
        self.pairs_failed.load(Ordering::Relaxed)
    }

    pub fn checkpoint_hits(&self) -> u64 {
        self.checkpoint_hits.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.pairs_correlated.store(0, Ordering::Relaxed);
        self.pairs_failed.store(0, Ordering::Relaxed);
        self.checkpoint_hits.store(0, Ordering::Relaxed);
    }
}
