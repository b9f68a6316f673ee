//! The merge steps.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lock::{RowLockSet, RowLockTable};
use crate::merge::{MergeOutcome, OpenCommit, UnitOfWork};
use crate::sequencer::CommitSequencer;
use crate::staging::StagingArea;
use crate::store::ObjectStore;
use crate::table::Tables;
use crate::types::{ObjectId, SessionId, TransactionId};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs the merge for one session's staging area.
pub(crate) fn move_from_temp<'a>(
    store: &'a ObjectStore,
    owner: SessionId,
    staging: &'a mut StagingArea,
    committing_tid: Option<TransactionId>,
    finalize_now: bool,
) -> CoreResult<MergeOutcome<'a>> {
    let (guard, tid) = store
        .sequencer()
        .lock_and_choose_tid(committing_tid)
        .inspect_err(|err| note_lock_timeout(store, err))?;

    store.merge_stats().record_merge_start();
    debug!(
        tid = tid.as_u64(),
        session = %owner,
        staged_states = staging.states().len(),
        staged_chunks = staging.chunks().len(),
        "merge started"
    );

    let unit = match build_unit(store, owner, staging, tid) {
        Ok(unit) => unit,
        Err(err) => {
            note_lock_timeout(store, &err);
            store.merge_stats().record_rollback();
            warn!(tid = tid.as_u64(), error = %err, "merge rolled back");
            return Err(err);
        }
    };

    let open = OpenCommit::new(store, guard, unit, staging);
    if finalize_now {
        open.finalize().map(MergeOutcome::Finalized)
    } else {
        Ok(MergeOutcome::Open(open))
    }
}

fn note_lock_timeout(store: &ObjectStore, err: &CoreError) {
    if matches!(err, CoreError::LockTimeout { .. }) {
        store.merge_stats().record_lock_timeout();
    }
}

fn build_unit<'a>(
    store: &'a ObjectStore,
    owner: SessionId,
    staging: &mut StagingArea,
    tid: TransactionId,
) -> CoreResult<UnitOfWork<'a>> {
    let config = store.config();
    let locks = lock_rows(store.row_locks(), owner, staging, config.row_lock_timeout)?;
    let mut unit = UnitOfWork::new(tid, locks);

    let objects = merge_states(&mut unit, staging, config.row_lock_timeout)?;
    let (purged, inserted) = {
        let tables = store.tables();
        merge_chunks(&mut unit, staging, &tables, config)?
    };
    reclaim_staging(&mut unit, staging);

    debug!(
        tid = tid.as_u64(),
        objects,
        chunks_purged = purged,
        chunks_inserted = inserted,
        "merge staged"
    );
    Ok(unit)
}

/// Locks every zoid the staged rows touch, in ascending order.
///
/// Later per-step acquisitions are re-entrant and never wait.
fn lock_rows<'a>(
    table: &'a RowLockTable,
    owner: SessionId,
    staging: &StagingArea,
    timeout: Duration,
) -> CoreResult<RowLockSet<'a>> {
    let zoids = staging.touched_object_ids();
    let locks = table.acquire(owner, &zoids, timeout)?;
    debug!(rows = locks.held().len(), "row locks acquired");
    Ok(locks)
}

/// Upserts every staged state into the unit, ascending by zoid.
fn merge_states(
    unit: &mut UnitOfWork<'_>,
    staging: &StagingArea,
    timeout: Duration,
) -> CoreResult<usize> {
    for (&zoid, state) in staging.states() {
        unit.locks_mut().acquire(&BTreeSet::from([zoid]), timeout)?;
        unit.upsert_state(zoid, state.clone());
    }
    Ok(staging.states().len())
}

/// Purges the permanent chunks of every object with staged chunks, then
/// inserts the staged chunks. Returns `(purged, inserted)` row counts.
fn merge_chunks(
    unit: &mut UnitOfWork<'_>,
    staging: &StagingArea,
    tables: &Tables,
    config: &Config,
) -> CoreResult<(usize, usize)> {
    let zoids: BTreeSet<ObjectId> = staging.chunk_object_ids();
    if zoids.is_empty() {
        return Ok((0, 0));
    }

    unit.locks_mut().acquire(&zoids, config.row_lock_timeout)?;
    let purged = tables.chunks.count_for_objects(&zoids);
    unit.purge(zoids, purged);

    for (&(zoid, chunk_num), chunk) in staging.chunks() {
        if chunk.len() > config.max_chunk_size {
            return Err(CoreError::integrity_violation(format!(
                "chunk {chunk_num} of {zoid} is {} bytes, limit is {}",
                chunk.len(),
                config.max_chunk_size
            )));
        }
        // Staged keys are unique and their zoids were purged above.
        debug_assert!(!unit.chunk_exists(tables, zoid, chunk_num));
        unit.insert_chunk(zoid, chunk_num, chunk.clone());
    }
    Ok((purged, staging.chunks().len()))
}

/// Empties staging, keeping the consumed rows in the unit until it ends.
fn reclaim_staging(unit: &mut UnitOfWork<'_>, staging: &mut StagingArea) {
    unit.keep_consumed(staging.clear(true));
}
