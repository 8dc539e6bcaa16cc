//! Delivery statistics for broadcast groups

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a group's delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Receivers currently registered
    pub receivers: usize,
    /// Values taken from the input and fanned out
    pub published: u64,
    /// Successful per-receiver deliveries
    pub delivered: u64,
    /// Per-receiver drops because the receiver's buffer was full
    pub dropped: u64,
    /// Receivers unregistered because their handle was dropped
    pub pruned: u64,
}

impl GroupStats {
    /// Fraction of delivery attempts that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.delivered + self.dropped;
        if attempts == 0 {
            0.0
        } else {
            self.dropped as f64 / attempts as f64
        }
    }
}

/// Live counters updated by the dispatch task
#[derive(Debug, Default)]
pub(crate) struct GroupCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    pruned: AtomicU64,
}

impl GroupCounters {
    /// Record one fan-out pass
    pub(crate) fn record_pass(&self, delivered: u64, dropped: u64) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Record a receiver unregistered by dropping its handle
    pub(crate) fn record_pruned(&self) {
        self.pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, receivers: usize) -> GroupStats {
        GroupStats {
            receivers,
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}
