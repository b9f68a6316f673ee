//! The `object_state` table.

use crate::types::{ObjectId, TransactionId};
use std::collections::BTreeMap;

/// One row of `object_state`: the current state of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStateRow {
    /// Transaction that last wrote the object.
    pub tid: TransactionId,
    /// Length of `state` in bytes, 0 when the state is absent.
    pub size: u64,
    /// Pickled object state; `None` for an object written without state.
    pub state: Option<Vec<u8>>,
}

impl ObjectStateRow {
    /// Builds a row, deriving `size` from the payload.
    #[must_use]
    pub fn new(tid: TransactionId, state: Option<Vec<u8>>) -> Self {
        let size = state.as_ref().map_or(0, |bytes| bytes.len() as u64);
        Self { tid, size, state }
    }
}

/// Whether an upsert created a row or overwrote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the object.
    Inserted,
    /// An existing row was overwritten.
    Updated,
}

/// Ordered map of `zoid -> ObjectStateRow`.
#[derive(Debug, Default)]
pub struct ObjectStateTable {
    rows: BTreeMap<ObjectId, ObjectStateRow>,
}

impl ObjectStateTable {
    /// Returns the row for `zoid`.
    #[must_use]
    pub fn get(&self, zoid: ObjectId) -> Option<&ObjectStateRow> {
        self.rows.get(&zoid)
    }

    /// Returns true if a row exists for `zoid`.
    #[must_use]
    pub fn contains(&self, zoid: ObjectId) -> bool {
        self.rows.contains_key(&zoid)
    }

    /// Inserts or overwrites the row for `zoid`.
    pub fn upsert(&mut self, zoid: ObjectId, row: ObjectStateRow) -> UpsertOutcome {
        match self.rows.insert(zoid, row) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        }
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

    /// Iterates rows in ascending zoid order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ObjectStateRow)> {
        self.rows.iter().map(|(zoid, row)| (*zoid, row))
    }
}
