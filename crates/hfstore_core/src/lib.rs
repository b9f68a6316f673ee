//! # hfstore core
//!
//! A history-free object store: every object keeps only its current state
//! and the chunks of its current blob.
//!
//! This crate provides:
//! - Per-session staging of object states and blob chunks
//! - The commit merge (`move_from_temp`): commit lock, tid selection, state
//!   upsert, chunk purge and insert, staging reclaim, finalization
//! - Ordered row locks and a timed commit lock
//! - A checksummed commit log with crash recovery and checkpoints

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
#[cfg(feature = "std")]
mod dir;
mod error;
mod lock;
mod merge;
mod sequencer;
mod session;
mod staging;
mod stats;
mod store;
mod table;
#[cfg(test)]
mod testing;
mod types;
mod wal;

pub use config::Config;
#[cfg(feature = "std")]
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use lock::{CommitLock, CommitLockGuard, RowLockSet, RowLockTable};
pub use merge::{MergeOutcome, OpenCommit, UnitOfWork};
pub use sequencer::{CommitSequencer, TidSequencer};
pub use session::Session;
pub use staging::{StagedBatch, StagingArea};
pub use stats::{MergeStats, StatsSnapshot};
pub use store::ObjectStore;
pub use table::{BlobChunkRow, BlobChunkTable, ObjectStateRow, ObjectStateTable, Tables, UpsertOutcome};
pub use types::{ChunkNum, ObjectId, SessionId, TransactionId};
pub use wal::{WalManager, WalRecord, WalRecordIterator, WalRecordType, WAL_MAGIC, WAL_VERSION};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
