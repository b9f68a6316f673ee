//! The `blob_chunk` table.

use crate::error::{CoreError, CoreResult};
use crate::types::{ChunkNum, ObjectId, TransactionId};
use std::collections::{BTreeMap, BTreeSet};

/// One row of `blob_chunk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobChunkRow {
    /// Transaction that wrote the chunk.
    pub tid: TransactionId,
    /// Chunk bytes.
    pub chunk: Vec<u8>,
}

/// Ordered map of `(zoid, chunk_num) -> BlobChunkRow`.
#[derive(Debug, Default)]
pub struct BlobChunkTable {
    rows: BTreeMap<(ObjectId, ChunkNum), BlobChunkRow>,
}

impl BlobChunkTable {
    /// Returns the chunks attached to `zoid`, ordered by chunk number.
    pub fn chunks_for(
        &self,
        zoid: ObjectId,
    ) -> impl Iterator<Item = (ChunkNum, &BlobChunkRow)> + '_ {
        self.rows
            .range((zoid, ChunkNum::MIN)..=(zoid, ChunkNum::MAX))
            .map(|((_, num), row)| (*num, row))
    }

    /// Returns true if any chunk is attached to `zoid`.
    #[must_use]
    pub fn has_chunks(&self, zoid: ObjectId) -> bool {
        self.chunks_for(zoid).next().is_some()
    }

    /// Returns true if the `(zoid, chunk_num)` row exists.
    #[must_use]
    pub fn contains(&self, zoid: ObjectId, chunk_num: ChunkNum) -> bool {
        self.rows.contains_key(&(zoid, chunk_num))
    }

    /// Inserts a new chunk row.
    ///
    /// # Errors
    ///
    /// Returns an integrity violation if the `(zoid, chunk_num)` row exists.
    pub fn insert(
        &mut self,
        zoid: ObjectId,
        chunk_num: ChunkNum,
        row: BlobChunkRow,
    ) -> CoreResult<()> {
        if self.contains(zoid, chunk_num) {
            return Err(CoreError::duplicate_chunk(zoid, chunk_num));
        }
        self.rows.insert((zoid, chunk_num), row);
        Ok(())
    }

    /// Deletes every chunk whose zoid is in `zoids`, whatever its number.
    ///
    /// The distinct id set drives the delete: each id becomes one range
    /// delete over the ordered index, visited in ascending zoid order.
    /// Returns the number of rows removed.
    pub fn delete_for_objects(&mut self, zoids: &BTreeSet<ObjectId>) -> usize {
        let mut removed = 0;
        for &zoid in zoids {
            let doomed: Vec<ChunkNum> = self.chunks_for(zoid).map(|(num, _)| num).collect();
            for num in doomed {
                self.rows.remove(&(zoid, num));
                removed += 1;
            }
        }
        removed
    }

    /// Counts the rows a [`BlobChunkTable::delete_for_objects`] would remove.
    #[must_use]
    pub fn count_for_objects(&self, zoids: &BTreeSet<ObjectId>) -> usize {
        zoids.iter().map(|&zoid| self.chunks_for(zoid).count()).sum()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates rows in `(zoid, chunk_num)` order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, ChunkNum, &BlobChunkRow)> {
        self.rows.iter().map(|((zoid, num), row)| (*zoid, *num, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tid: u64, bytes: &[u8]) -> BlobChunkRow {
        BlobChunkRow {
            tid: TransactionId::new(tid),
            chunk: bytes.to_vec(),
        }
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut table = BlobChunkTable::default();
        let zoid = ObjectId::new(1);
        table.insert(zoid, 0, row(1, b"a")).unwrap();
        let err = table.insert(zoid, 0, row(2, b"b")).unwrap_err();
        assert!(matches!(err, CoreError::IntegrityViolation { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn delete_for_objects_removes_every_chunk_number() {
        let mut table = BlobChunkTable::default();
        for num in 0..4 {
            table.insert(ObjectId::new(7), num, row(1, b"old")).unwrap();
        }
        table.insert(ObjectId::new(6), 0, row(1, b"left")).unwrap();
        table.insert(ObjectId::new(8), 9, row(1, b"right")).unwrap();

        let doomed: BTreeSet<_> = [ObjectId::new(7), ObjectId::new(100)].into();
        assert_eq!(table.count_for_objects(&doomed), 4);
        assert_eq!(table.delete_for_objects(&doomed), 4);

        assert!(!table.has_chunks(ObjectId::new(7)));
        assert!(table.contains(ObjectId::new(6), 0));
        assert!(table.contains(ObjectId::new(8), 9));
    }

    #[test]
    fn chunks_for_is_ordered_and_scoped() {
        let mut table = BlobChunkTable::default();
        table.insert(ObjectId::new(2), 1, row(1, b"b")).unwrap();
        table.insert(ObjectId::new(2), 0, row(1, b"a")).unwrap();
        table.insert(ObjectId::new(3), 0, row(1, b"x")).unwrap();

        let nums: Vec<_> = table.chunks_for(ObjectId::new(2)).map(|(n, _)| n).collect();
        assert_eq!(nums, vec![0, 1]);
    }
}
