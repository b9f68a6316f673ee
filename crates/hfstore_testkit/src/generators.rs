//! Property-based test generators using proptest.
//!
//! Provides strategies for generating staged batches that respect the
//! staging constraints: one state row per object, chunks numbered from 0.

use crate::model::ObjectWrite;
use hfstore_core::ObjectId;
use proptest::prelude::*;

/// Strategy for object ids drawn from a small pool, so batches overlap.
pub fn object_id_strategy(pool: u64) -> impl Strategy<Value = ObjectId> {
    (1..=pool.max(1)).prop_map(ObjectId::new)
}

/// Strategy for object states, sometimes absent.
pub fn state_strategy() -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::weighted(0.9, prop::collection::vec(any::<u8>(), 0..64))
}

/// Strategy for the chunks of one blob; may be empty (no blob staged).
pub fn chunks_strategy(max_chunks: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..=max_chunks)
}

/// Strategy for the staged writes of one object.
pub fn object_write_strategy(pool: u64) -> impl Strategy<Value = ObjectWrite> {
    (
        object_id_strategy(pool),
        prop::option::weighted(0.8, state_strategy()),
        chunks_strategy(4),
    )
        .prop_map(|(zoid, state, chunks)| ObjectWrite {
            zoid,
            state,
            chunks,
        })
}

/// Strategy for one session's staged batch, at most one write per object.
pub fn batch_strategy(pool: u64, max_objects: usize) -> impl Strategy<Value = Vec<ObjectWrite>> {
    prop::collection::btree_map(
        object_id_strategy(pool),
        object_write_strategy(pool),
        0..=max_objects,
    )
    .prop_map(|writes| {
        writes
            .into_iter()
            .map(|(zoid, write)| ObjectWrite { zoid, ..write })
            .collect()
    })
}

/// Strategy for a sequence of batches committed one after another.
pub fn batch_sequence_strategy(
    pool: u64,
    max_batches: usize,
) -> impl Strategy<Value = Vec<Vec<ObjectWrite>>> {
    prop::collection::vec(batch_strategy(pool, 6), 1..=max_batches)
}

/// Test configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropertyTestConfig {
    /// Number of test cases to generate.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropertyTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropertyTestConfig {
    /// Quick configuration for fast tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Thorough configuration for comprehensive tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1000,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
