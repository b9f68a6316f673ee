//! Commit and row locking.
//!
//! - [`CommitLock`] serializes committers. Whoever holds its guard is the
//!   only session choosing a tid or merging staged rows.
//! - [`RowLockTable`] hands out per-object locks. A session always asks for
//!   its whole object set at once and takes it in ascending zoid order, so
//!   two sessions with overlapping sets cannot wait on each other in a cycle.
//!
//! Both return RAII guards; dropping the guard releases the lock on every
//! exit path, including errors.

mod commit;
mod rows;

pub use commit::{CommitLock, CommitLockGuard};
pub use rows::{RowLockSet, RowLockTable};
