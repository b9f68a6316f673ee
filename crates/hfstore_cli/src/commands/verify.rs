//! Verify command implementation.

use hfstore_core::ObjectStore;
use std::path::Path;
use tracing::info;

/// One integrity problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Object the problem concerns.
    pub zoid: u64,
    /// What is wrong.
    pub message: String,
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Verifying store at {:?}", path);
    let store = super::open_existing(path)?;
    let issues = verify(&store)?;

    if issues.is_empty() {
        println!("OK: {} objects, {} chunks", store.object_count(), store.chunk_count());
        return Ok(());
    }

    for issue in &issues {
        println!("zoid {}: {}", issue.zoid, issue.message);
    }
    Err(format!("{} integrity issue(s) found", issues.len()).into())
}

/// Checks the store's tables.
///
/// - every chunk belongs to an object with a state row
/// - all chunks of an object were written by one transaction
/// - each state row's size matches its payload
/// - no row was written after the last finalized tid
///
/// Reading the whole commit log also validates its checksums.
pub fn verify(store: &ObjectStore) -> Result<Vec<Issue>, Box<dyn std::error::Error>> {
    store.wal_records()?;
    let last = store.last_tid();
    let mut issues = Vec::new();

    for (zoid, chunk_num) in store.orphaned_chunks() {
        issues.push(Issue {
            zoid: zoid.as_u64(),
            message: format!("chunk {chunk_num} has no object state row"),
        });
    }

    let tables = store.tables();
    for (zoid, row) in tables.objects.iter() {
        let actual = row.state.as_ref().map_or(0, |state| state.len() as u64);
        if row.size != actual {
            issues.push(Issue {
                zoid: zoid.as_u64(),
                message: format!("size {} does not match {actual} state bytes", row.size),
            });
        }
        if row.tid > last {
            issues.push(Issue {
                zoid: zoid.as_u64(),
                message: format!("state written by {} after last commit {last}", row.tid),
            });
        }
    }

    let mut current = None;
    for (zoid, chunk_num, row) in tables.chunks.iter() {
        match current {
            Some((seen, tid)) if seen == zoid && tid != row.tid => {
                issues.push(Issue {
                    zoid: zoid.as_u64(),
                    message: format!("chunk {chunk_num} written by {}, earlier chunks by {tid}", row.tid),
                });
            }
            Some((seen, _)) if seen == zoid => {}
            _ => current = Some((zoid, row.tid)),
        }
    }

    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfstore_core::ObjectId;

    #[test]
    fn clean_store_has_no_issues() {
        let store = ObjectStore::open_in_memory().unwrap();
        let mut session = store.session();
        session.store_temp(ObjectId::new(1), Some(vec![1, 2]));
        session.upload_blob(ObjectId::new(1), b"blob").unwrap();
        session.commit().unwrap();

        assert!(verify(&store).unwrap().is_empty());
    }

    #[test]
    fn run_checks_directory_store() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store");
        {
            let store = ObjectStore::open(&path, hfstore_core::Config::default()).unwrap();
            let mut session = store.session();
            session.store_temp(ObjectId::new(1), Some(b"state".to_vec()));
            session.upload_blob(ObjectId::new(1), b"blob").unwrap();
            session.commit().unwrap();
        }

        assert!(run(&path).is_ok());
        assert!(run(&temp.path().join("missing")).is_err());
    }

    #[test]
    fn orphaned_chunk_is_reported() {
        let store = ObjectStore::open_in_memory().unwrap();
        let mut session = store.session();
        session.store_chunk(ObjectId::new(3), 0, vec![1]);
        session.commit().unwrap();

        let issues = verify(&store).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].zoid, 3);
    }
}
