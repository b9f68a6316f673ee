//! Per-object row locks.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, SessionId};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Table of row locks keyed by zoid.
#[derive(Debug, Default)]
pub struct RowLockTable {
    owners: Mutex<HashMap<ObjectId, SessionId>>,
    released: Condvar,
}

impl RowLockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an empty lock set owned by `owner`.
    #[must_use]
    pub fn lock_set(&self, owner: SessionId) -> RowLockSet<'_> {
        RowLockSet {
            table: self,
            owner,
            held: BTreeSet::new(),
            order: Vec::new(),
        }
    }

    /// Convenience for collaborators outside the merge: lock `zoids` for
    /// `owner` in one call.
    ///
    /// # Errors
    ///
    /// See [`RowLockSet::acquire`].
    pub fn acquire(
        &self,
        owner: SessionId,
        zoids: &BTreeSet<ObjectId>,
        timeout: Duration,
    ) -> CoreResult<RowLockSet<'_>> {
        let mut set = self.lock_set(owner);
        set.acquire(zoids, timeout)?;
        Ok(set)
    }

    /// Returns the session holding the lock on `zoid`, if any.
    #[must_use]
    pub fn owner_of(&self, zoid: ObjectId) -> Option<SessionId> {
        self.owners.lock().get(&zoid).copied()
    }

    /// Number of locked rows.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.owners.lock().len()
    }

    fn release(&self, zoids: &BTreeSet<ObjectId>) {
        if zoids.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for zoid in zoids {
            owners.remove(zoid);
        }
        drop(owners);
        self.released.notify_all();
    }
}

/// Row locks held by one session. Released together on drop.
#[derive(Debug)]
pub struct RowLockSet<'a> {
    table: &'a RowLockTable,
    owner: SessionId,
    held: BTreeSet<ObjectId>,
    order: Vec<ObjectId>,
}

impl RowLockSet<'_> {
    /// Locks every zoid in `zoids`, in ascending order.
    ///
    /// Zoids already held by this set, or by another set of the same
    /// session, are skipped. Each wait is bounded by `timeout`; locks taken
    /// before a timeout stay in the set and are released when it drops.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] naming the first zoid that could
    /// not be locked in time.
    pub fn acquire(&mut self, zoids: &BTreeSet<ObjectId>, timeout: Duration) -> CoreResult<()> {
        let mut owners = self.table.owners.lock();
        for &zoid in zoids {
            if self.held.contains(&zoid) {
                continue;
            }
            let deadline = Instant::now() + timeout;
            loop {
                match owners.get(&zoid).copied() {
                    None => {
                        owners.insert(zoid, self.owner);
                        self.held.insert(zoid);
                        self.order.push(zoid);
                        break;
                    }
                    Some(holder) if holder == self.owner => break,
                    Some(_) => {
                        if self
                            .table
                            .released
                            .wait_until(&mut owners, deadline)
                            .timed_out()
                            && owners.get(&zoid).is_some_and(|h| *h != self.owner)
                        {
                            return Err(CoreError::lock_timeout(format!("row lock on {zoid}")));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Session owning the set.
    #[must_use]
    pub fn owner(&self) -> SessionId {
        self.owner
    }

    /// Zoids locked by this set.
    #[must_use]
    pub fn held(&self) -> &BTreeSet<ObjectId> {
        &self.held
    }

    /// Zoids in the order this set locked them.
    #[must_use]
    pub fn acquisition_order(&self) -> &[ObjectId] {
        &self.order
    }
}

impl Drop for RowLockSet<'_> {
    fn drop(&mut self) {
        self.table.release(&self.held);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn zoids(ids: &[u64]) -> BTreeSet<ObjectId> {
        ids.iter().copied().map(ObjectId::new).collect()
    }

    #[test]
    fn locks_in_ascending_order_and_releases_on_drop() {
        let table = RowLockTable::new();
        let owner = SessionId::new();
        {
            let set = table
                .acquire(owner, &zoids(&[9, 3, 5]), Duration::from_millis(10))
                .unwrap();
            assert_eq!(
                set.acquisition_order(),
                &[ObjectId::new(3), ObjectId::new(5), ObjectId::new(9)]
            );
            assert_eq!(table.owner_of(ObjectId::new(5)), Some(owner));
        }
        assert_eq!(table.locked_count(), 0);
    }

    #[test]
    fn same_session_is_reentrant() {
        let table = RowLockTable::new();
        let owner = SessionId::new();
        let mut set = table.lock_set(owner);
        set.acquire(&zoids(&[1, 2]), Duration::from_millis(10)).unwrap();
        set.acquire(&zoids(&[2, 3]), Duration::from_millis(10)).unwrap();
        assert_eq!(set.held().len(), 3);
        assert_eq!(set.owner(), owner);
    }

    #[test]
    fn contended_row_times_out() {
        let table = RowLockTable::new();
        let _other = table
            .acquire(SessionId::new(), &zoids(&[4]), Duration::from_millis(10))
            .unwrap();

        let mut set = table.lock_set(SessionId::new());
        let err = set
            .acquire(&zoids(&[2, 4]), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        // zoid 2 was taken before the wait and is released with the set.
        assert_eq!(set.held(), &zoids(&[2]));
        drop(set);
        assert_eq!(table.owner_of(ObjectId::new(2)), None);
    }

    #[test]
    fn waiter_proceeds_once_holder_releases() {
        let table = Arc::new(RowLockTable::new());
        let holder = table
            .acquire(SessionId::new(), &zoids(&[1]), Duration::from_millis(10))
            .unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let set = table
                    .acquire(SessionId::new(), &zoids(&[1]), Duration::from_secs(5))
                    .unwrap();
                set.held().len()
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(holder);
        assert_eq!(waiter.join().unwrap(), 1);
    }
}
