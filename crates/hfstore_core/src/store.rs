//! The object store: permanent tables, commit log and recovery.

use crate::config::Config;
#[cfg(feature = "std")]
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::lock::{CommitLockGuard, RowLockTable};
use crate::merge::UnitOfWork;
use crate::sequencer::{CommitSequencer, TidSequencer};
use crate::session::Session;
use crate::stats::{MergeStats, StatsSnapshot};
use crate::table::{BlobChunkRow, ObjectStateRow, Tables};
use crate::types::{ChunkNum, ObjectId, TransactionId};
use crate::wal::{WalManager, WalRecord};
use hfstore_storage::{InMemoryBackend, StorageBackend};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::BTreeSet;
#[cfg(feature = "std")]
use std::path::Path;
use tracing::{info, warn};

/// A history-free object store.
///
/// Holds the current state of every object and its blob chunks. Writes go
/// through a [`Session`]: stage rows, then merge them with
/// [`Session::move_from_temp`]. The store is `Sync`; share it between
/// threads behind an `Arc` and give each thread its own session.
///
/// ```rust,ignore
/// use hfstore_core::{ObjectId, ObjectStore};
///
/// let store = ObjectStore::open_in_memory()?;
/// let mut session = store.session();
/// session.store_temp(ObjectId::new(7), Some(b"state".to_vec()));
/// session.upload_blob(ObjectId::new(7), b"blob bytes")?;
/// let tid = session.move_from_temp(None, true)?.tid();
///
/// assert_eq!(store.read_blob(ObjectId::new(7)), Some(b"blob bytes".to_vec()));
/// ```
#[derive(Debug)]
pub struct ObjectStore {
    config: Config,
    sequencer: TidSequencer,
    row_locks: RowLockTable,
    tables: RwLock<Tables>,
    wal: WalManager,
    stats: MergeStats,
    #[cfg(feature = "std")]
    _dir: Option<StoreDir>,
}

/// What recovery rebuilt from the log.
struct Recovered {
    tables: Tables,
    last_tid: TransactionId,
}

impl ObjectStore {
    /// Opens a store in a directory, creating it if allowed by `config`.
    ///
    /// The directory is locked for the lifetime of the store and the commit
    /// log inside it is replayed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another process has the store
    /// open, or any recovery error.
    #[cfg(feature = "std")]
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        use hfstore_storage::FileBackend;

        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open_with_create_dirs(&dir.wal_path())?;
        let mut store = Self::open_with_backend(config, Box::new(backend))?;
        store._dir = Some(dir);
        Ok(store)
    }

    /// Opens an empty in-memory store with the default configuration.
    ///
    /// # Errors
    ///
    /// Does not fail in practice; the signature matches the other openers.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Does not fail in practice; the signature matches the other openers.
    pub fn open_in_memory_with_config(config: Config) -> CoreResult<Self> {
        Self::open_with_backend(config, Box::new(InMemoryBackend::new()))
    }

    /// Opens a store over an existing commit log backend and replays it.
    ///
    /// # Errors
    ///
    /// Fails if the log is corrupted or cannot be read.
    pub fn open_with_backend(
        config: Config,
        wal_backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let wal = WalManager::new(wal_backend, config.sync_on_commit);
        let recovered = Self::recover(&wal)?;

        Ok(Self {
            sequencer: TidSequencer::new(recovered.last_tid, config.commit_lock_timeout),
            row_locks: RowLockTable::new(),
            tables: RwLock::new(recovered.tables),
            wal,
            stats: MergeStats::new(),
            config,
            #[cfg(feature = "std")]
            _dir: None,
        })
    }

    /// Rebuilds the tables from the log.
    ///
    /// Only transactions closed by a `Commit` are replayed. Anything after
    /// the last `Commit` or `Checkpoint` is an unfinished merge and is cut
    /// off the log.
    fn recover(wal: &WalManager) -> CoreResult<Recovered> {
        let mut tables = Tables::new();
        let mut last_tid = TransactionId::NONE;
        let mut open: Option<(TransactionId, Vec<WalRecord>)> = None;
        let mut durable_end = 0u64;
        let mut replayed = 0usize;

        {
            let mut records = wal.iter()?;
            while let Some(item) = records.next() {
                let (offset, record) = item?;
                match record {
                    WalRecord::Begin { tid } => {
                        if let Some((unfinished, _)) = open.take() {
                            warn!(tid = unfinished.as_u64(), "discarding unfinished transaction");
                        }
                        open = Some((tid, Vec::new()));
                    }
                    WalRecord::Commit { tid } => match open.take() {
                        Some((begun, rows)) if begun == tid => {
                            for row in rows {
                                Self::replay(&mut tables, row)?;
                            }
                            last_tid = last_tid.max(tid);
                            replayed += 1;
                            durable_end = records.position();
                        }
                        _ => {
                            return Err(CoreError::wal_corruption(format!(
                                "commit of {tid} at offset {offset} without matching begin"
                            )));
                        }
                    },
                    WalRecord::Checkpoint { tid } => {
                        last_tid = last_tid.max(tid);
                        durable_end = records.position();
                    }
                    row => match open.as_mut() {
                        Some((_, rows)) => rows.push(row),
                        None => {
                            return Err(CoreError::wal_corruption(format!(
                                "record at offset {offset} outside a transaction"
                            )));
                        }
                    },
                }
            }
        }

        let size = wal.size()?;
        if durable_end < size {
            warn!(
                discarded_bytes = size - durable_end,
                "truncating unfinished tail of commit log"
            );
            wal.truncate(durable_end)?;
        }

        info!(
            transactions = replayed,
            last_tid = last_tid.as_u64(),
            objects = tables.objects.len(),
            chunks = tables.chunks.len(),
            "recovery complete"
        );
        Ok(Recovered { tables, last_tid })
    }

    fn replay(tables: &mut Tables, record: WalRecord) -> CoreResult<()> {
        match record {
            WalRecord::StoreObject { tid, zoid, state } => {
                tables.objects.upsert(zoid, ObjectStateRow::new(tid, state));
            }
            WalRecord::PurgeChunks { zoids, .. } => {
                let zoids: BTreeSet<ObjectId> = zoids.into_iter().collect();
                tables.chunks.delete_for_objects(&zoids);
            }
            WalRecord::StoreChunk {
                tid,
                zoid,
                chunk_num,
                chunk,
            } => {
                tables
                    .chunks
                    .insert(zoid, chunk_num, BlobChunkRow { tid, chunk })
                    .map_err(|_| {
                        CoreError::wal_corruption(format!(
                            "log stores chunk {chunk_num} of {zoid} twice"
                        ))
                    })?;
            }
            WalRecord::Begin { .. } | WalRecord::Commit { .. } | WalRecord::Checkpoint { .. } => {}
        }
        Ok(())
    }

    /// Starts a new session with an empty staging area.
    #[must_use]
    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// Returns the current state row of `zoid`.
    #[must_use]
    pub fn load(&self, zoid: ObjectId) -> Option<ObjectStateRow> {
        self.tables.read().objects.get(zoid).cloned()
    }

    /// Returns the chunks of `zoid`, ordered by chunk number.
    #[must_use]
    pub fn blob_chunks(&self, zoid: ObjectId) -> Vec<(ChunkNum, BlobChunkRow)> {
        self.tables
            .read()
            .chunks
            .chunks_for(zoid)
            .map(|(num, row)| (num, row.clone()))
            .collect()
    }

    /// Returns the blob of `zoid`: its chunks concatenated in order.
    ///
    /// `None` if the object has no chunks.
    #[must_use]
    pub fn read_blob(&self, zoid: ObjectId) -> Option<Vec<u8>> {
        let tables = self.tables.read();
        let mut chunks = tables.chunks.chunks_for(zoid).peekable();
        chunks.peek()?;
        Some(chunks.flat_map(|(_, row)| row.chunk.iter().copied()).collect())
    }

    /// Last finalized transaction id.
    #[must_use]
    pub fn last_tid(&self) -> TransactionId {
        self.sequencer.last_committed()
    }

    /// Number of object-state rows.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.tables.read().objects.len()
    }

    /// Number of blob-chunk rows.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.tables.read().chunks.len()
    }

    /// Chunks whose object has no state row.
    #[must_use]
    pub fn orphaned_chunks(&self) -> Vec<(ObjectId, ChunkNum)> {
        let tables = self.tables.read();
        tables
            .chunks
            .iter()
            .filter(|(zoid, _, _)| !tables.objects.contains(*zoid))
            .map(|(zoid, num, _)| (zoid, num))
            .collect()
    }

    /// Read access to the finalized tables.
    ///
    /// Holding the guard blocks finalization; keep it short.
    pub fn tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read()
    }

    /// The row lock table shared by every session.
    #[must_use]
    pub fn row_locks(&self) -> &RowLockTable {
        &self.row_locks
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot of the merge counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Every record in the commit log, with its offset.
    ///
    /// # Errors
    ///
    /// Fails on log corruption or storage errors.
    pub fn wal_records(&self) -> CoreResult<Vec<(u64, WalRecord)>> {
        self.wal.read_all()
    }

    /// Size of the commit log in bytes.
    ///
    /// # Errors
    ///
    /// Fails on storage errors.
    pub fn wal_size(&self) -> CoreResult<u64> {
        self.wal.size()
    }

    /// Rewrites the commit log as a single snapshot of the current tables.
    ///
    /// Waits for the commit lock, so no merge is in flight while the
    /// snapshot is taken. Returns the tid the snapshot is current as of.
    ///
    /// # Errors
    ///
    /// Fails on lock timeout or storage errors; the old log then stays.
    pub fn checkpoint(&self) -> CoreResult<TransactionId> {
        let guard = self.sequencer.acquire_commit_lock().inspect_err(|err| {
            if matches!(err, CoreError::LockTimeout { .. }) {
                self.stats.record_lock_timeout();
            }
        })?;
        let last = self.sequencer.last_committed();

        let records = {
            let tables = self.tables.read();
            snapshot_records(&tables, last)
        };
        self.wal.replace(&records)?;
        drop(guard);

        self.stats.record_checkpoint();
        info!(tid = last.as_u64(), records = records.len(), "checkpoint written");
        Ok(last)
    }

    pub(crate) fn sequencer(&self) -> &TidSequencer {
        &self.sequencer
    }

    pub(crate) fn merge_stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Logs `unit`, applies it to the tables and advances the last tid.
    pub(crate) fn finalize_unit(
        &self,
        guard: &CommitLockGuard<'_>,
        unit: &UnitOfWork<'_>,
    ) -> CoreResult<()> {
        self.wal.append_transaction(&unit.wal_records())?;
        let created = {
            let mut tables = self.tables.write();
            unit.apply(&mut tables)?
        };
        self.sequencer.record_committed(guard, unit.tid());

        self.stats.record_finalized(
            unit.states().len(),
            created,
            unit.purged_rows(),
            unit.chunks().len(),
        );
        info!(
            tid = unit.tid().as_u64(),
            objects = unit.states().len(),
            objects_created = created,
            chunks_purged = unit.purged_rows(),
            chunks_inserted = unit.chunks().len(),
            "merge finalized"
        );
        Ok(())
    }
}

/// Log records recreating `tables` in one transaction, followed by a
/// checkpoint marker. Rows keep the tid that last wrote them.
fn snapshot_records(tables: &Tables, last: TransactionId) -> Vec<WalRecord> {
    let mut records = Vec::with_capacity(tables.objects.len() + tables.chunks.len() + 3);
    records.push(WalRecord::Begin { tid: last });
    for (zoid, row) in tables.objects.iter() {
        records.push(WalRecord::StoreObject {
            tid: row.tid,
            zoid,
            state: row.state.clone(),
        });
    }
    for (zoid, chunk_num, row) in tables.chunks.iter() {
        records.push(WalRecord::StoreChunk {
            tid: row.tid,
            zoid,
            chunk_num,
            chunk: row.chunk.clone(),
        });
    }
    records.push(WalRecord::Commit { tid: last });
    records.push(WalRecord::Checkpoint { tid: last });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBackend;
    use tempfile::tempdir;

    fn zoid(n: u64) -> ObjectId {
        ObjectId::new(n)
    }

    fn reopen(backend: &SharedBackend) -> ObjectStore {
        ObjectStore::open_with_backend(Config::default(), backend.boxed()).unwrap()
    }

    fn commit_blob(store: &ObjectStore, z: u64, state: &[u8], blob: &[u8]) -> TransactionId {
        let mut session = store.session();
        session.store_temp(zoid(z), Some(state.to_vec()));
        session.upload_blob(zoid(z), blob).unwrap();
        session.commit().unwrap()
    }

    #[test]
    fn open_in_memory_is_empty() {
        let store = ObjectStore::open_in_memory().unwrap();
        assert_eq!(store.last_tid(), TransactionId::NONE);
        assert_eq!(store.object_count(), 0);
        assert_eq!(store.read_blob(zoid(1)), None);
    }

    #[test]
    fn recovery_replays_finalized_merges() {
        let backend = SharedBackend::new();
        {
            let store = reopen(&backend);
            commit_blob(&store, 1, b"a", &[1; 10]);
            commit_blob(&store, 1, b"b", &[2; 3]);
            commit_blob(&store, 2, b"c", b"");
        }

        let store = reopen(&backend);
        assert_eq!(store.last_tid(), TransactionId::new(3));
        let row = store.load(zoid(1)).unwrap();
        assert_eq!(row.tid, TransactionId::new(2));
        assert_eq!(row.state.as_deref(), Some(&b"b"[..]));
        assert_eq!(store.read_blob(zoid(1)), Some(vec![2; 3]));
        assert_eq!(store.read_blob(zoid(2)), Some(Vec::new()));

        let mut session = store.session();
        assert_eq!(session.commit().unwrap(), TransactionId::new(4));
    }

    #[test]
    fn recovery_discards_unfinished_transaction() {
        let backend = SharedBackend::new();
        let committed_size = {
            let store = reopen(&backend);
            commit_blob(&store, 1, b"kept", b"blob");
            store.wal_size().unwrap()
        };

        let wal = WalManager::new(backend.boxed(), false);
        let tid = TransactionId::new(2);
        wal.append(&WalRecord::Begin { tid }).unwrap();
        wal.append(&WalRecord::StoreObject {
            tid,
            zoid: zoid(1),
            state: Some(b"lost".to_vec()),
        })
        .unwrap();
        drop(wal);

        let store = reopen(&backend);
        assert_eq!(store.last_tid(), TransactionId::new(1));
        assert_eq!(store.load(zoid(1)).unwrap().state.as_deref(), Some(&b"kept"[..]));
        assert_eq!(store.wal_size().unwrap(), committed_size);
    }

    #[test]
    fn recovery_cuts_torn_record() {
        let backend = SharedBackend::new();
        let committed = {
            let store = reopen(&backend);
            commit_blob(&store, 3, b"x", b"y");
            backend.bytes()
        };

        let mut torn = committed.clone();
        torn.extend_from_slice(&WAL_TORN_PREFIX);
        backend.set_bytes(torn);

        let store = reopen(&backend);
        assert_eq!(store.last_tid(), TransactionId::new(1));
        assert_eq!(backend.bytes(), committed);
    }

    const WAL_TORN_PREFIX: [u8; 6] = [b'H', b'W', b'A', b'L', 1, 0];

    #[test]
    fn corrupted_log_refuses_to_open() {
        let backend = SharedBackend::new();
        {
            let store = reopen(&backend);
            commit_blob(&store, 1, b"a", b"b");
        }
        let mut bytes = backend.bytes();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        backend.set_bytes(bytes);

        let result = ObjectStore::open_with_backend(Config::default(), backend.boxed());
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn damaged_record_length_refuses_to_open_and_keeps_log() {
        let backend = SharedBackend::new();
        {
            let store = reopen(&backend);
            for n in 1..=3 {
                commit_blob(&store, n, b"state", b"blob");
            }
        }
        let mut bytes = backend.bytes();
        bytes[7..11].copy_from_slice(&u32::MAX.to_le_bytes());
        backend.set_bytes(bytes.clone());

        let result = ObjectStore::open_with_backend(Config::default(), backend.boxed());
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
        assert_eq!(backend.bytes(), bytes);
    }

    #[test]
    fn replaying_same_transaction_twice_leaves_identical_row() {
        let backend = SharedBackend::new();
        let tid = TransactionId::new(1);
        let transaction = [
            WalRecord::Begin { tid },
            WalRecord::StoreObject {
                tid,
                zoid: zoid(4),
                state: Some(b"same".to_vec()),
            },
            WalRecord::Commit { tid },
        ];

        let wal = WalManager::new(backend.boxed(), false);
        wal.append_transaction(&transaction).unwrap();
        drop(wal);
        let once = reopen(&backend).load(zoid(4)).unwrap();

        let wal = WalManager::new(backend.boxed(), false);
        wal.append_transaction(&transaction).unwrap();
        drop(wal);
        let store = reopen(&backend);

        assert_eq!(store.load(zoid(4)).unwrap(), once);
        assert_eq!(store.object_count(), 1);
        assert_eq!(store.last_tid(), tid);
    }

    #[test]
    fn checkpoint_preserves_rows_and_tids() {
        let backend = SharedBackend::new();
        {
            let store = reopen(&backend);
            let first = commit_blob(&store, 1, b"one", &[1; 8]);
            for _ in 0..5 {
                commit_blob(&store, 2, b"two", &[2; 8]);
            }
            let before = store.wal_size().unwrap();

            assert_eq!(store.checkpoint().unwrap(), TransactionId::new(6));
            assert!(store.wal_size().unwrap() < before);
            assert_eq!(store.load(zoid(1)).unwrap().tid, first);
            assert_eq!(store.stats().checkpoints, 1);
        }

        let store = reopen(&backend);
        assert_eq!(store.last_tid(), TransactionId::new(6));
        assert_eq!(store.load(zoid(1)).unwrap().tid, TransactionId::new(1));
        assert_eq!(store.load(zoid(2)).unwrap().tid, TransactionId::new(6));
        assert_eq!(store.read_blob(zoid(2)), Some(vec![2; 8]));
        assert_eq!(store.blob_chunks(zoid(1))[0].1.tid, TransactionId::new(1));

        commit_blob(&store, 1, b"after", b"z");
        drop(store);
        let store = reopen(&backend);
        assert_eq!(store.last_tid(), TransactionId::new(7));
        assert_eq!(store.read_blob(zoid(1)), Some(b"z".to_vec()));
    }

    #[test]
    fn orphaned_chunks_are_reported() {
        let store = ObjectStore::open_in_memory().unwrap();
        let mut session = store.session();
        session.store_chunk(zoid(4), 0, vec![1]);
        session.store_temp(zoid(5), None);
        session.store_chunk(zoid(5), 0, vec![2]);
        session.commit().unwrap();

        assert_eq!(store.orphaned_chunks(), vec![(zoid(4), 0)]);
    }

    #[test]
    fn directory_store_persists_and_locks() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        {
            let store = ObjectStore::open(&path, Config::default()).unwrap();
            commit_blob(&store, 1, b"state", b"persisted blob");

            let second = ObjectStore::open(&path, Config::default());
            assert!(matches!(second, Err(CoreError::StoreLocked)));
        }
        assert!(path.join("commit.wal").exists());

        let store = ObjectStore::open(&path, Config::default()).unwrap();
        assert_eq!(store.read_blob(zoid(1)), Some(b"persisted blob".to_vec()));
        store.checkpoint().unwrap();
        drop(store);

        let store = ObjectStore::open(&path, Config::default()).unwrap();
        assert_eq!(store.load(zoid(1)).unwrap().state.as_deref(), Some(&b"state"[..]));
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let temp = tempdir().unwrap();
        let config = Config::default().create_if_missing(false);
        let result = ObjectStore::open(&temp.path().join("absent"), config);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }
}
