//! The history-free commit merge.
//!
//! `move_from_temp` turns a session's staged rows into permanent rows under
//! one transaction id, as a single all-or-nothing unit of work:
//!
//! 1. take the commit lock and choose (or validate) the tid
//! 2. lock every touched row, ascending by zoid
//! 3. upsert the staged object states
//! 4. purge the permanent chunks of every object with staged chunks, then
//!    insert the staged chunks
//! 5. empty the staging area
//!
//! Steps 3 and 4 write into a private [`UnitOfWork`]. Finalization logs the
//! unit, applies it to the tables and releases every lock; until then
//! readers keep seeing the previous state. A failure before finalization
//! completes rolls the unit back and leaves staging as it was.

mod mover;
mod outcome;
mod unit;

pub(crate) use mover::move_from_temp;
pub use outcome::{MergeOutcome, OpenCommit};
pub use unit::UnitOfWork;
