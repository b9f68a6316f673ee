//! Commit sequencing: the commit lock plus transaction id selection.

use crate::error::{CoreError, CoreResult};
use crate::lock::{CommitLock, CommitLockGuard};
use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Serializes committers and hands out their transaction ids.
///
/// Taking the commit lock is the capability every commit needs, whether or
/// not it already carries a tid; [`CommitSequencer::lock_and_choose_tid`]
/// therefore always calls [`CommitSequencer::acquire_commit_lock`] first and
/// only then decides between allocating and validating.
pub trait CommitSequencer: Send + Sync {
    /// Waits for the commit lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if the lock cannot be obtained in time.
    fn acquire_commit_lock(&self) -> CoreResult<CommitLockGuard<'_>>;

    /// Picks the tid for the commit holding `guard`.
    ///
    /// With a `candidate` no allocation happens; the candidate is checked
    /// against the committed history and used as is.
    ///
    /// # Errors
    ///
    /// Fails if the candidate does not advance the history or the tid space
    /// is exhausted.
    fn choose_tid(
        &self,
        guard: &CommitLockGuard<'_>,
        candidate: Option<TransactionId>,
    ) -> CoreResult<TransactionId>;

    /// Records that `tid` has been finalized. Called with the lock still held.
    fn record_committed(&self, guard: &CommitLockGuard<'_>, tid: TransactionId);

    /// Last finalized tid, [`TransactionId::NONE`] before the first commit.
    fn last_committed(&self) -> TransactionId;

    /// Takes the commit lock, then chooses (or validates) the tid.
    ///
    /// # Errors
    ///
    /// Propagates lock timeouts and tid validation failures unchanged.
    fn lock_and_choose_tid(
        &self,
        candidate: Option<TransactionId>,
    ) -> CoreResult<(CommitLockGuard<'_>, TransactionId)> {
        let guard = self.acquire_commit_lock()?;
        let tid = self.choose_tid(&guard, candidate)?;
        Ok((guard, tid))
    }
}

/// Default sequencer: tids count up by one from the last finalized tid.
#[derive(Debug)]
pub struct TidSequencer {
    lock: CommitLock,
    last_committed: AtomicU64,
    lock_timeout: Duration,
}

impl TidSequencer {
    /// Creates a sequencer whose history ends at `last_committed`.
    #[must_use]
    pub fn new(last_committed: TransactionId, lock_timeout: Duration) -> Self {
        Self {
            lock: CommitLock::new(),
            last_committed: AtomicU64::new(last_committed.as_u64()),
            lock_timeout,
        }
    }

    /// The underlying commit lock.
    #[must_use]
    pub fn commit_lock(&self) -> &CommitLock {
        &self.lock
    }
}

impl CommitSequencer for TidSequencer {
    fn acquire_commit_lock(&self) -> CoreResult<CommitLockGuard<'_>> {
        self.lock.acquire(self.lock_timeout)
    }

    fn choose_tid(
        &self,
        _guard: &CommitLockGuard<'_>,
        candidate: Option<TransactionId>,
    ) -> CoreResult<TransactionId> {
        let last = self.last_committed();
        let tid = match candidate {
            Some(candidate) if candidate > last => candidate,
            Some(candidate) => return Err(CoreError::InvalidTid { candidate, last }),
            None => last
                .checked_next()
                .ok_or_else(|| CoreError::invalid_operation("transaction id space exhausted"))?,
        };
        debug!(tid = tid.as_u64(), preassigned = candidate.is_some(), "tid chosen");
        Ok(tid)
    }

    fn record_committed(&self, _guard: &CommitLockGuard<'_>, tid: TransactionId) {
        self.last_committed.store(tid.as_u64(), Ordering::SeqCst);
    }

    fn last_committed(&self) -> TransactionId {
        TransactionId::new(self.last_committed.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequencer(last: u64) -> TidSequencer {
        TidSequencer::new(TransactionId::new(last), Duration::from_millis(20))
    }

    #[test]
    fn allocates_after_last_committed() {
        let seq = sequencer(41);
        let (_guard, tid) = seq.lock_and_choose_tid(None).unwrap();
        assert_eq!(tid, TransactionId::new(42));
    }

    #[test]
    fn allocation_does_not_advance_until_recorded() {
        let seq = sequencer(1);
        {
            let (_guard, tid) = seq.lock_and_choose_tid(None).unwrap();
            assert_eq!(tid, TransactionId::new(2));
        }
        let (guard, tid) = seq.lock_and_choose_tid(None).unwrap();
        assert_eq!(tid, TransactionId::new(2));
        seq.record_committed(&guard, tid);
        assert_eq!(seq.last_committed(), TransactionId::new(2));
    }

    #[test]
    fn candidate_skips_allocation_but_still_locks() {
        let seq = sequencer(5);
        let (_guard, tid) = seq.lock_and_choose_tid(Some(TransactionId::new(90))).unwrap();
        assert_eq!(tid, TransactionId::new(90));
        assert!(seq.commit_lock().is_locked());

        let err = seq.lock_and_choose_tid(None).unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
    }

    #[test]
    fn stale_candidate_is_rejected() {
        let seq = sequencer(5);
        let err = seq
            .lock_and_choose_tid(Some(TransactionId::new(5)))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTid { .. }));
        // The guard was dropped with the error.
        assert!(!seq.commit_lock().is_locked());
    }

    #[test]
    fn exhausted_tid_space() {
        let seq = sequencer(u64::MAX);
        assert!(seq.lock_and_choose_tid(None).is_err());
    }
}
