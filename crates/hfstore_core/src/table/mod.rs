//! Permanent storage tables.
//!
//! Two tables hold the current (and only) version of every object:
//!
//! ```text
//! object_state  (zoid PRIMARY KEY, tid, size, state)
//! blob_chunk    (zoid, chunk_num, tid, chunk)   PRIMARY KEY (zoid, chunk_num)
//! ```
//!
//! Both are ordered maps so that per-object ranges can be scanned and
//! deleted in ascending zoid order. The tables are only ever mutated by
//! applying a finalized [`crate::merge::UnitOfWork`]; readers see them
//! through the store's read lock.

mod blob_chunk;
mod object_state;

pub use blob_chunk::{BlobChunkRow, BlobChunkTable};
pub use object_state::{ObjectStateRow, ObjectStateTable, UpsertOutcome};

/// The pair of permanent tables guarded together by the store.
#[derive(Debug, Default)]
pub struct Tables {
    /// Current object states.
    pub objects: ObjectStateTable,
    /// Current blob chunks.
    pub chunks: BlobChunkTable,
}

impl Tables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
