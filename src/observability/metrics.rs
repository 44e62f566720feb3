//! Merge counters
//!
//! - Counters only, monotonic
//! - Shared across merges through an `Arc`
//! - Relaxed atomics; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide merge counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    merges_started: AtomicU64,
    merges_completed: AtomicU64,
    merges_failed: AtomicU64,
    merges_aborted: AtomicU64,
    rows_merged: AtomicU64,
    rows_emitted: AtomicU64,
    duplicates_suppressed: AtomicU64,
    groups_flushed: AtomicU64,
    shards_skipped: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_merges_started(&self) {
        self.merges_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_merges_completed(&self) {
        self.merges_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_merges_failed(&self) {
        self.merges_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_merges_aborted(&self) {
        self.merges_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the row counts of one finished merge
    pub fn record_rows(&self, merged: u64, emitted: u64, duplicates: u64, groups: u64) {
        self.rows_merged.fetch_add(merged, Ordering::Relaxed);
        self.rows_emitted.fetch_add(emitted, Ordering::Relaxed);
        self.duplicates_suppressed.fetch_add(duplicates, Ordering::Relaxed);
        self.groups_flushed.fetch_add(groups, Ordering::Relaxed);
    }

    pub fn add_shards_skipped(&self, count: u64) {
        self.shards_skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            merges_started: self.merges_started.load(Ordering::Relaxed),
            merges_completed: self.merges_completed.load(Ordering::Relaxed),
            merges_failed: self.merges_failed.load(Ordering::Relaxed),
            merges_aborted: self.merges_aborted.load(Ordering::Relaxed),
            rows_merged: self.rows_merged.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            groups_flushed: self.groups_flushed.load(Ordering::Relaxed),
            shards_skipped: self.shards_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub merges_started: u64,
    pub merges_completed: u64,
    pub merges_failed: u64,
    pub merges_aborted: u64,
    pub rows_merged: u64,
    pub rows_emitted: u64,
    pub duplicates_suppressed: u64,
    pub groups_flushed: u64,
    pub shards_skipped: u64,
}
