//! Merge results and the open-commit handle.

use crate::error::{CoreError, CoreResult};
use crate::lock::CommitLockGuard;
use crate::merge::UnitOfWork;
use crate::staging::StagingArea;
use crate::store::ObjectStore;
use crate::types::TransactionId;
use tracing::{info, warn};

/// Result of [`crate::Session::move_from_temp`].
#[derive(Debug)]
pub enum MergeOutcome<'a> {
    /// The merge is durable and visible; every lock has been released.
    Finalized(TransactionId),
    /// The merge is complete but pending; locks are still held.
    Open(OpenCommit<'a>),
}

impl<'a> MergeOutcome<'a> {
    /// The transaction id the rows were merged under.
    #[must_use]
    pub fn tid(&self) -> TransactionId {
        match self {
            Self::Finalized(tid) => *tid,
            Self::Open(open) => open.tid(),
        }
    }

    /// Returns true for [`MergeOutcome::Finalized`].
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    /// Returns the open commit, if the merge was left pending.
    #[must_use]
    pub fn into_open(self) -> Option<OpenCommit<'a>> {
        match self {
            Self::Finalized(_) => None,
            Self::Open(open) => Some(open),
        }
    }
}

/// A merged but not yet finalized commit.
///
/// Holds the commit lock, the row locks and the pending unit of work. Call
/// [`OpenCommit::finalize`] or [`OpenCommit::abort`]; dropping the handle
/// aborts.
#[derive(Debug)]
pub struct OpenCommit<'a> {
    store: &'a ObjectStore,
    staging: &'a mut StagingArea,
    tid: TransactionId,
    // Field order matters: the unit (row locks) drops before the commit lock.
    pending: Option<(UnitOfWork<'a>, CommitLockGuard<'a>)>,
}

impl<'a> OpenCommit<'a> {
    pub(crate) fn new(
        store: &'a ObjectStore,
        guard: CommitLockGuard<'a>,
        unit: UnitOfWork<'a>,
        staging: &'a mut StagingArea,
    ) -> Self {
        Self {
            store,
            staging,
            tid: unit.tid(),
            pending: Some((unit, guard)),
        }
    }

    /// Transaction id of the pending commit.
    #[must_use]
    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    /// The pending unit of work.
    #[must_use]
    pub fn unit(&self) -> Option<&UnitOfWork<'a>> {
        self.pending.as_ref().map(|(unit, _)| unit)
    }

    /// Logs and applies the unit, then releases every lock.
    ///
    /// # Errors
    ///
    /// On a log write failure the unit is rolled back, the staged rows are
    /// put back into the session's staging area and the error is returned.
    pub fn finalize(mut self) -> CoreResult<TransactionId> {
        let (mut unit, guard) = self
            .pending
            .take()
            .ok_or_else(|| CoreError::invalid_operation("commit already closed"))?;

        match self.store.finalize_unit(&guard, &unit) {
            Ok(()) => {
                drop(unit);
                drop(guard);
                Ok(self.tid)
            }
            Err(err) => {
                if let Some(batch) = unit.take_consumed() {
                    self.staging.restore(batch);
                }
                self.store.merge_stats().record_rollback();
                warn!(tid = self.tid.as_u64(), error = %err, "finalization failed, merge rolled back");
                drop(unit);
                drop(guard);
                Err(err)
            }
        }
    }

    /// Discards the unit and releases every lock.
    ///
    /// The staged rows the merge consumed are dropped with it.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if let Some((unit, guard)) = self.pending.take() {
            self.store.merge_stats().record_rollback();
            info!(tid = self.tid.as_u64(), "open commit aborted");
            drop(unit);
            drop(guard);
        }
    }
}

impl Drop for OpenCommit<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}
