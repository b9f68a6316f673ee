//! Per-session staging area.
//!
//! Before a transaction commits, its writes live here and nowhere else:
//!
//! ```text
//! temp_store       (zoid PRIMARY KEY, state)
//! temp_blob_chunk  (zoid, chunk_num, chunk)   PRIMARY KEY (zoid, chunk_num)
//! ```
//!
//! The area belongs to exactly one session. The commit merge consumes it
//! once and empties it.

use crate::error::{CoreError, CoreResult};
use crate::types::{ChunkNum, ObjectId};
use std::collections::{BTreeMap, BTreeSet};

/// Rows removed from a staging area, kept so a failed commit can be retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedBatch {
    /// Staged object states.
    pub states: BTreeMap<ObjectId, Option<Vec<u8>>>,
    /// Staged blob chunks.
    pub chunks: BTreeMap<(ObjectId, ChunkNum), Vec<u8>>,
}

impl StagedBatch {
    /// Returns true if the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.chunks.is_empty()
    }
}

/// Temporary rows written by one session.
#[derive(Debug, Default)]
pub struct StagingArea {
    rows: StagedBatch,
}

impl StagingArea {
    /// Creates an empty staging area.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages the new state of `zoid`, replacing any earlier staged state.
    ///
    /// `None` stages the object without state.
    pub fn store_temp(&mut self, zoid: ObjectId, state: Option<Vec<u8>>) {
        self.rows.states.insert(zoid, state);
    }

    /// Stages a single chunk, replacing the same chunk if already staged.
    pub fn store_chunk(&mut self, zoid: ObjectId, chunk_num: ChunkNum, chunk: Vec<u8>) {
        self.rows.chunks.insert((zoid, chunk_num), chunk);
    }

    /// Stages `data` as the complete blob of `zoid`.
    ///
    /// Chunks already staged for `zoid` are discarded first; `data` is then
    /// split into `chunk_size` pieces numbered from 0. An empty blob is
    /// staged as a single empty chunk. Returns the number of chunks staged.
    ///
    /// # Errors
    ///
    /// Fails if `chunk_size` is zero or the blob needs more chunks than a
    /// [`ChunkNum`] can count.
    pub fn upload_blob(
        &mut self,
        zoid: ObjectId,
        data: &[u8],
        chunk_size: usize,
    ) -> CoreResult<usize> {
        if chunk_size == 0 {
            return Err(CoreError::invalid_operation("blob chunk size must be positive"));
        }
        self.discard_chunks(zoid);

        if data.is_empty() {
            self.store_chunk(zoid, 0, Vec::new());
            return Ok(1);
        }

        let mut staged = 0;
        for (index, piece) in data.chunks(chunk_size).enumerate() {
            let chunk_num = ChunkNum::try_from(index).map_err(|_| {
                CoreError::invalid_operation(format!("blob for {zoid} has too many chunks"))
            })?;
            self.store_chunk(zoid, chunk_num, piece.to_vec());
            staged += 1;
        }
        Ok(staged)
    }

    /// Drops every chunk staged for `zoid`.
    pub fn discard_chunks(&mut self, zoid: ObjectId) {
        self.rows
            .chunks
            .retain(|(staged_zoid, _), _| *staged_zoid != zoid);
    }

    /// Staged object states in ascending zoid order.
    #[must_use]
    pub fn states(&self) -> &BTreeMap<ObjectId, Option<Vec<u8>>> {
        &self.rows.states
    }

    /// Staged chunks in `(zoid, chunk_num)` order.
    #[must_use]
    pub fn chunks(&self) -> &BTreeMap<(ObjectId, ChunkNum), Vec<u8>> {
        &self.rows.chunks
    }

    /// Distinct zoids that have at least one staged chunk.
    #[must_use]
    pub fn chunk_object_ids(&self) -> BTreeSet<ObjectId> {
        self.rows.chunks.keys().map(|(zoid, _)| *zoid).collect()
    }

    /// Distinct zoids touched by any staged row.
    #[must_use]
    pub fn touched_object_ids(&self) -> BTreeSet<ObjectId> {
        let mut zoids = self.chunk_object_ids();
        zoids.extend(self.rows.states.keys().copied());
        zoids
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Removes every staged row.
    ///
    /// With `preserve_for_retry` the removed rows are handed back so that a
    /// failed commit attempt can put them back with [`StagingArea::restore`];
    /// otherwise they are dropped.
    pub fn clear(&mut self, preserve_for_retry: bool) -> Option<StagedBatch> {
        let batch = std::mem::take(&mut self.rows);
        preserve_for_retry.then_some(batch)
    }

    /// Puts back rows previously removed by `clear(true)`.
    ///
    /// Rows staged since the clear win over the restored ones.
    pub fn restore(&mut self, batch: StagedBatch) {
        let newer = std::mem::replace(&mut self.rows, batch);
        self.rows.states.extend(newer.states);
        self.rows.chunks.extend(newer.chunks);
    }
}
