//! Merge statistics.
//!
//! Counters are atomic and can be read while merges are in progress.
//!
//! ```rust,ignore
//! let store = ObjectStore::open_in_memory()?;
//! // ... commit some sessions ...
//! let stats = store.stats();
//! println!("finalized: {}", stats.merges_finalized);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live merge counters owned by a store.
#[derive(Debug, Default)]
pub struct MergeStats {
    // Merge lifecycle
    merges_started: AtomicU64,
    merges_finalized: AtomicU64,
    merges_rolled_back: AtomicU64,

    // Rows
    objects_merged: AtomicU64,
    objects_created: AtomicU64,
    chunks_purged: AtomicU64,
    chunks_inserted: AtomicU64,

    lock_timeouts: AtomicU64,
    checkpoints: AtomicU64,
}

impl MergeStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_merge_start(&self) {
        self.merges_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finalized merge together with its row counts.
    ///
    /// `created` is the part of `objects` that had no state row before.
    pub(crate) fn record_finalized(
        &self,
        objects: usize,
        created: usize,
        purged: usize,
        inserted: usize,
    ) {
        self.merges_finalized.fetch_add(1, Ordering::Relaxed);
        self.objects_merged.fetch_add(objects as u64, Ordering::Relaxed);
        self.objects_created.fetch_add(created as u64, Ordering::Relaxed);
        self.chunks_purged.fetch_add(purged as u64, Ordering::Relaxed);
        self.chunks_inserted.fetch_add(inserted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.merges_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of merges started.
    pub fn merges_started(&self) -> u64 {
        self.merges_started.load(Ordering::Relaxed)
    }

    /// Returns the number of merges finalized.
    pub fn merges_finalized(&self) -> u64 {
        self.merges_finalized.load(Ordering::Relaxed)
    }

    /// Returns the number of merges rolled back (failed or aborted).
    pub fn merges_rolled_back(&self) -> u64 {
        self.merges_rolled_back.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            merges_started: self.merges_started(),
            merges_finalized: self.merges_finalized(),
            merges_rolled_back: self.merges_rolled_back(),
            objects_merged: self.objects_merged.load(Ordering::Relaxed),
            objects_created: self.objects_created.load(Ordering::Relaxed),
            chunks_purged: self.chunks_purged.load(Ordering::Relaxed),
            chunks_inserted: self.chunks_inserted.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`MergeStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Merges that got past tid selection.
    pub merges_started: u64,
    /// Merges whose unit of work was finalized.
    pub merges_finalized: u64,
    /// Merges rolled back after a failure or an explicit abort.
    pub merges_rolled_back: u64,
    /// Object-state rows written by finalized merges.
    pub objects_merged: u64,
    /// Object-state rows inserted for the first time; the rest were updates.
    pub objects_created: u64,
    /// Permanent chunks deleted by finalized merges.
    pub chunks_purged: u64,
    /// Chunks inserted by finalized merges.
    pub chunks_inserted: u64,
    /// Commit or row lock waits that timed out.
    pub lock_timeouts: u64,
    /// Checkpoints written.
    pub checkpoints: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = MergeStats::new();
        stats.record_merge_start();
        stats.record_merge_start();
        stats.record_finalized(3, 1, 2, 5);
        stats.record_rollback();
        stats.record_lock_timeout();

        let snap = stats.snapshot();
        assert_eq!(snap.merges_started, 2);
        assert_eq!(snap.merges_finalized, 1);
        assert_eq!(snap.merges_rolled_back, 1);
        assert_eq!(snap.objects_merged, 3);
        assert_eq!(snap.objects_created, 1);
        assert_eq!(snap.chunks_purged, 2);
        assert_eq!(snap.chunks_inserted, 5);
        assert_eq!(snap.lock_timeouts, 1);
        assert_eq!(snap.checkpoints, 0);
    }
}
