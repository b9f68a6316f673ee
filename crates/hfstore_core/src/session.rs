//! Sessions: one client's staging area and its commits.

use crate::error::CoreResult;
use crate::merge::{self, MergeOutcome};
use crate::staging::StagingArea;
use crate::store::ObjectStore;
use crate::types::{ChunkNum, ObjectId, SessionId, TransactionId};

/// One client connection to a store.
///
/// A session stages object states and blob chunks privately, then merges
/// them into the store in one commit. Sessions are not shared between
/// threads; open one per thread.
#[derive(Debug)]
pub struct Session<'s> {
    store: &'s ObjectStore,
    id: SessionId,
    staging: StagingArea,
}

impl<'s> Session<'s> {
    pub(crate) fn new(store: &'s ObjectStore) -> Self {
        Self {
            store,
            id: SessionId::new(),
            staging: StagingArea::new(),
        }
    }

    /// This session's id, the owner of its row locks.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The store this session writes to.
    #[must_use]
    pub fn store(&self) -> &'s ObjectStore {
        self.store
    }

    /// Stages the new state of `zoid`.
    pub fn store_temp(&mut self, zoid: ObjectId, state: Option<Vec<u8>>) {
        self.staging.store_temp(zoid, state);
    }

    /// Stages one blob chunk.
    pub fn store_chunk(&mut self, zoid: ObjectId, chunk_num: ChunkNum, chunk: Vec<u8>) {
        self.staging.store_chunk(zoid, chunk_num, chunk);
    }

    /// Stages `data` as the whole blob of `zoid`, split into chunks of the
    /// configured size. Returns the number of chunks staged.
    ///
    /// # Errors
    ///
    /// Fails if the configured chunk size is zero.
    pub fn upload_blob(&mut self, zoid: ObjectId, data: &[u8]) -> CoreResult<usize> {
        let chunk_size = self.store.config().blob_chunk_size;
        self.staging.upload_blob(zoid, data, chunk_size)
    }

    /// The rows staged so far.
    #[must_use]
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Merges every staged row into the store under one transaction id.
    ///
    /// Takes the commit lock, chooses a tid (or validates `committing_tid`),
    /// upserts the staged states, replaces the blob chunks of every object
    /// with staged chunks and empties the staging area. With `finalize_now`
    /// the merge is then made durable and visible and every lock is
    /// released; otherwise the returned [`MergeOutcome::Open`] keeps the
    /// locks until it is finalized or aborted.
    ///
    /// # Errors
    ///
    /// Lock timeouts, an invalid `committing_tid`, malformed staged rows and
    /// log failures are returned unchanged. In every error case the store is
    /// untouched, staging still holds the rows and no lock stays held.
    pub fn move_from_temp(
        &mut self,
        committing_tid: Option<TransactionId>,
        finalize_now: bool,
    ) -> CoreResult<MergeOutcome<'_>> {
        merge::move_from_temp(
            self.store,
            self.id,
            &mut self.staging,
            committing_tid,
            finalize_now,
        )
    }

    /// Merges and finalizes in one call. Returns the tid.
    ///
    /// # Errors
    ///
    /// See [`Session::move_from_temp`].
    pub fn commit(&mut self) -> CoreResult<TransactionId> {
        self.move_from_temp(None, true).map(|outcome| outcome.tid())
    }
}
