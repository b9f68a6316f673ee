//! A reference model of the store.
//!
//! The model applies committed batches one after another in tid order. Any
//! interleaving of concurrent merges must leave the store equal to the
//! model fed the same batches under the same tids.

use hfstore_core::{ChunkNum, ObjectId, ObjectStore, Session, TransactionId};
use std::collections::BTreeMap;

/// Staged writes for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectWrite {
    /// Object written.
    pub zoid: ObjectId,
    /// Staged state row, if any; the inner value is the payload.
    pub state: Option<Option<Vec<u8>>>,
    /// Staged chunks numbered from 0. Empty means no chunks are staged.
    pub chunks: Vec<Vec<u8>>,
}

impl ObjectWrite {
    /// A state-only write.
    pub fn state(zoid: ObjectId, state: Option<Vec<u8>>) -> Self {
        Self {
            zoid,
            state: Some(state),
            chunks: Vec::new(),
        }
    }

    /// A write with a state and a blob.
    pub fn with_blob(zoid: ObjectId, state: Option<Vec<u8>>, chunks: Vec<Vec<u8>>) -> Self {
        Self {
            zoid,
            state: Some(state),
            chunks,
        }
    }
}

/// Stages `batch` in `session`.
pub fn stage(session: &mut Session<'_>, batch: &[ObjectWrite]) {
    for write in batch {
        if let Some(state) = &write.state {
            session.store_temp(write.zoid, state.clone());
        }
        for (num, chunk) in write.chunks.iter().enumerate() {
            session.store_chunk(write.zoid, num as ChunkNum, chunk.clone());
        }
    }
}

/// Expected contents of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceModel {
    states: BTreeMap<ObjectId, (TransactionId, Option<Vec<u8>>)>,
    blobs: BTreeMap<ObjectId, (TransactionId, Vec<Vec<u8>>)>,
    last_tid: TransactionId,
}

impl ReferenceModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one committed batch.
    pub fn apply(&mut self, tid: TransactionId, batch: &[ObjectWrite]) {
        for write in batch {
            if let Some(state) = &write.state {
                self.states.insert(write.zoid, (tid, state.clone()));
            }
            if !write.chunks.is_empty() {
                self.blobs.insert(write.zoid, (tid, write.chunks.clone()));
            }
        }
        self.last_tid = self.last_tid.max(tid);
    }

    /// Number of objects with a state row.
    pub fn object_count(&self) -> usize {
        self.states.len()
    }

    /// Total number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.blobs.values().map(|(_, chunks)| chunks.len()).sum()
    }

    /// Compares the store against the model, describing the first mismatch.
    pub fn check(&self, store: &ObjectStore) -> Result<(), String> {
        if store.last_tid() != self.last_tid {
            return Err(format!(
                "last tid: store {}, model {}",
                store.last_tid(),
                self.last_tid
            ));
        }
        if store.object_count() != self.object_count() {
            return Err(format!(
                "object count: store {}, model {}",
                store.object_count(),
                self.object_count()
            ));
        }
        if store.chunk_count() != self.chunk_count() {
            return Err(format!(
                "chunk count: store {}, model {}",
                store.chunk_count(),
                self.chunk_count()
            ));
        }

        for (&zoid, (tid, state)) in &self.states {
            let row = store
                .load(zoid)
                .ok_or_else(|| format!("{zoid}: missing state row"))?;
            if row.tid != *tid || &row.state != state {
                return Err(format!("{zoid}: state row written by {}, expected {tid}", row.tid));
            }
        }

        for (&zoid, (tid, chunks)) in &self.blobs {
            let stored = store.blob_chunks(zoid);
            let expected: Vec<(ChunkNum, &[u8])> = chunks
                .iter()
                .enumerate()
                .map(|(num, chunk)| (num as ChunkNum, chunk.as_slice()))
                .collect();
            let actual: Vec<(ChunkNum, &[u8])> = stored
                .iter()
                .map(|(num, row)| (*num, row.chunk.as_slice()))
                .collect();
            if actual != expected {
                return Err(format!(
                    "{zoid}: {} chunks stored, {} expected",
                    actual.len(),
                    expected.len()
                ));
            }
            if let Some((num, row)) = stored.iter().find(|(_, row)| row.tid != *tid) {
                return Err(format!("{zoid}: chunk {num} written by {}, expected {tid}", row.tid));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_tracks_last_write() {
        let store = ObjectStore::open_in_memory().unwrap();
        let mut model = ReferenceModel::new();
        let batches = [
            vec![ObjectWrite::with_blob(
                ObjectId::new(1),
                Some(b"a".to_vec()),
                vec![b"x".to_vec(), b"y".to_vec()],
            )],
            vec![
                ObjectWrite::state(ObjectId::new(1), Some(b"b".to_vec())),
                ObjectWrite::with_blob(ObjectId::new(2), None, vec![Vec::new()]),
            ],
        ];

        for batch in &batches {
            let mut session = store.session();
            stage(&mut session, batch);
            let tid = session.commit().unwrap();
            model.apply(tid, batch);
        }

        assert_eq!(model.chunk_count(), 3);
        model.check(&store).unwrap();
    }

    #[test]
    fn check_reports_mismatch() {
        let store = ObjectStore::open_in_memory().unwrap();
        let mut model = ReferenceModel::new();
        model.apply(
            TransactionId::new(1),
            &[ObjectWrite::state(ObjectId::new(1), None)],
        );
        assert!(model.check(&store).is_err());
    }
}
