//! The pending unit of work of one merge.

use crate::error::CoreResult;
use crate::lock::RowLockSet;
use crate::staging::StagedBatch;
use crate::table::{BlobChunkRow, ObjectStateRow, Tables, UpsertOutcome};
use crate::types::{ChunkNum, ObjectId, TransactionId};
use crate::wal::WalRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Writes produced by one merge, held privately until finalization.
///
/// Nothing here is visible to readers. The unit owns the row locks taken by
/// the merge, so dropping it releases them. It also keeps the staged batch
/// the merge consumed, for restoring staging if finalization fails.
#[derive(Debug)]
pub struct UnitOfWork<'a> {
    tid: TransactionId,
    states: BTreeMap<ObjectId, ObjectStateRow>,
    purged: BTreeSet<ObjectId>,
    purged_rows: usize,
    chunks: BTreeMap<(ObjectId, ChunkNum), BlobChunkRow>,
    locks: RowLockSet<'a>,
    consumed: Option<StagedBatch>,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(tid: TransactionId, locks: RowLockSet<'a>) -> Self {
        Self {
            tid,
            states: BTreeMap::new(),
            purged: BTreeSet::new(),
            purged_rows: 0,
            chunks: BTreeMap::new(),
            locks,
            consumed: None,
        }
    }

    /// Transaction id every row of the unit is written under.
    #[must_use]
    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    /// Pending object-state rows, ascending by zoid.
    #[must_use]
    pub fn states(&self) -> &BTreeMap<ObjectId, ObjectStateRow> {
        &self.states
    }

    /// Zoids whose permanent chunks will be deleted.
    #[must_use]
    pub fn purged(&self) -> &BTreeSet<ObjectId> {
        &self.purged
    }

    /// Permanent chunk rows the purge will delete.
    #[must_use]
    pub fn purged_rows(&self) -> usize {
        self.purged_rows
    }

    /// Pending chunk rows.
    #[must_use]
    pub fn chunks(&self) -> &BTreeMap<(ObjectId, ChunkNum), BlobChunkRow> {
        &self.chunks
    }

    /// Row locks held by the unit.
    #[must_use]
    pub fn locks(&self) -> &RowLockSet<'a> {
        &self.locks
    }

    pub(crate) fn locks_mut(&mut self) -> &mut RowLockSet<'a> {
        &mut self.locks
    }

    pub(crate) fn upsert_state(&mut self, zoid: ObjectId, state: Option<Vec<u8>>) {
        self.states.insert(zoid, ObjectStateRow::new(self.tid, state));
    }

    pub(crate) fn purge(&mut self, zoids: BTreeSet<ObjectId>, existing_rows: usize) {
        self.purged_rows += existing_rows;
        self.purged.extend(zoids);
    }

    /// Returns true if `(zoid, chunk_num)` would exist once the unit is
    /// applied on top of `tables`.
    pub(crate) fn chunk_exists(&self, tables: &Tables, zoid: ObjectId, chunk_num: ChunkNum) -> bool {
        self.chunks.contains_key(&(zoid, chunk_num))
            || (!self.purged.contains(&zoid) && tables.chunks.contains(zoid, chunk_num))
    }

    pub(crate) fn insert_chunk(&mut self, zoid: ObjectId, chunk_num: ChunkNum, chunk: Vec<u8>) {
        let row = BlobChunkRow {
            tid: self.tid,
            chunk,
        };
        self.chunks.insert((zoid, chunk_num), row);
    }

    pub(crate) fn keep_consumed(&mut self, batch: Option<StagedBatch>) {
        self.consumed = batch;
    }

    pub(crate) fn take_consumed(&mut self) -> Option<StagedBatch> {
        self.consumed.take()
    }

    /// Log records describing the unit, bracketed by `Begin` and `Commit`.
    #[must_use]
    pub fn wal_records(&self) -> Vec<WalRecord> {
        let tid = self.tid;
        let mut records = Vec::with_capacity(self.states.len() + self.chunks.len() + 3);
        records.push(WalRecord::Begin { tid });
        for (&zoid, row) in &self.states {
            records.push(WalRecord::StoreObject {
                tid,
                zoid,
                state: row.state.clone(),
            });
        }
        if !self.purged.is_empty() {
            records.push(WalRecord::PurgeChunks {
                tid,
                zoids: self.purged.iter().copied().collect(),
            });
        }
        for (&(zoid, chunk_num), row) in &self.chunks {
            records.push(WalRecord::StoreChunk {
                tid,
                zoid,
                chunk_num,
                chunk: row.chunk.clone(),
            });
        }
        records.push(WalRecord::Commit { tid });
        records
    }

    /// Applies the unit to the permanent tables. Returns how many state
    /// rows were inserted rather than updated.
    ///
    /// The purge runs before the inserts, so a chunk number reused by the
    /// new blob never collides with the old one.
    ///
    /// # Errors
    ///
    /// Returns an integrity violation on a duplicate chunk key.
    pub(crate) fn apply(&self, tables: &mut Tables) -> CoreResult<usize> {
        tables.chunks.delete_for_objects(&self.purged);
        let mut created = 0;
        for (&zoid, row) in &self.states {
            if tables.objects.upsert(zoid, row.clone()) == UpsertOutcome::Inserted {
                created += 1;
            }
        }
        for (&(zoid, chunk_num), row) in &self.chunks {
            tables.chunks.insert(zoid, chunk_num, row.clone())?;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::RowLockTable;
    use crate::types::SessionId;

    fn tid(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn records_are_bracketed_and_ordered() {
        let locks = RowLockTable::new();
        let mut unit = UnitOfWork::new(tid(5), locks.lock_set(SessionId::new()));
        unit.upsert_state(ObjectId::new(2), Some(b"b".to_vec()));
        unit.upsert_state(ObjectId::new(1), None);
        unit.purge([ObjectId::new(2)].into_iter().collect(), 0);
        unit.insert_chunk(ObjectId::new(2), 0, b"x".to_vec());

        let records = unit.wal_records();
        assert_eq!(records.first(), Some(&WalRecord::Begin { tid: tid(5) }));
        assert_eq!(records.last(), Some(&WalRecord::Commit { tid: tid(5) }));
        assert!(matches!(
            records[1],
            WalRecord::StoreObject { zoid, .. } if zoid == ObjectId::new(1)
        ));
        assert!(matches!(records[3], WalRecord::PurgeChunks { .. }));
        assert!(records.iter().all(|r| r.tid() == tid(5)));
    }

    #[test]
    fn apply_purges_before_insert() {
        let zoid = ObjectId::new(9);
        let mut tables = Tables::new();
        for num in 0..3 {
            tables
                .chunks
                .insert(zoid, num, BlobChunkRow { tid: tid(1), chunk: vec![0] })
                .unwrap();
        }

        let locks = RowLockTable::new();
        let mut unit = UnitOfWork::new(tid(2), locks.lock_set(SessionId::new()));
        unit.upsert_state(zoid, Some(vec![1]));
        unit.purge([zoid].into_iter().collect(), 3);
        assert!(!unit.chunk_exists(&tables, zoid, 0));
        unit.insert_chunk(zoid, 0, vec![7]);
        assert!(unit.chunk_exists(&tables, zoid, 0));

        unit.apply(&mut tables).unwrap();
        let chunks: Vec<_> = tables.chunks.chunks_for(zoid).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1.tid, tid(2));
        assert_eq!(tables.objects.get(zoid).unwrap().tid, tid(2));
    }

    #[test]
    fn dropping_unit_releases_row_locks() {
        let locks = RowLockTable::new();
        let owner = SessionId::new();
        {
            let set = locks
                .acquire(owner, &[ObjectId::new(1)].into_iter().collect(), std::time::Duration::ZERO)
                .unwrap();
            let _unit = UnitOfWork::new(tid(1), set);
            assert_eq!(locks.locked_count(), 1);
        }
        assert_eq!(locks.locked_count(), 0);
    }
}
