//! Stress tests for hfstore.
//!
//! Runs overlapping merges from many threads and checks that the outcome
//! equals applying the same batches serially in tid order.

use crate::model::{stage, ObjectWrite, ReferenceModel};
use hfstore_core::{ObjectId, ObjectStore, TransactionId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total commits attempted.
    pub total_ops: usize,
    /// Commits that finalized.
    pub successful_ops: usize,
    /// Commits that failed.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Commits per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total commits: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} commits/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent sessions, one per thread.
    pub threads: usize,
    /// Commits each session performs.
    pub commits_per_thread: usize,
    /// Number of distinct objects; smaller pools mean more overlap.
    pub object_pool: u64,
    /// Objects staged per commit.
    pub objects_per_commit: usize,
    /// Largest number of chunks staged per object.
    pub max_chunks: usize,
    /// Every n-th commit is left open and finalized in a second step.
    pub deferred_finalize_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            commits_per_thread: 200,
            object_pool: 16,
            objects_per_commit: 4,
            max_chunks: 4,
            deferred_finalize_every: 5,
        }
    }
}

/// Committed batches with their tids, in completion order.
pub type CommitLog = Vec<(TransactionId, Vec<ObjectWrite>)>;

/// Small deterministic generator so runs are reproducible without `rand`.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound.max(1)
    }
}

fn random_batch(rng: &mut XorShift, config: &StressConfig, label: &str) -> Vec<ObjectWrite> {
    let mut writes = BTreeMap::new();
    for _ in 0..config.objects_per_commit {
        let zoid = ObjectId::new(rng.below(config.object_pool) + 1);
        let chunk_count = rng.below(config.max_chunks as u64 + 1) as usize;
        let chunks = (0..chunk_count)
            .map(|num| format!("{label}/{zoid}/{num}").into_bytes())
            .collect();
        let state = match rng.below(4) {
            0 => None,
            _ => Some(Some(format!("{label}/{zoid}").into_bytes())),
        };
        writes.insert(zoid, ObjectWrite { zoid, state, chunks });
    }
    writes.into_values().collect()
}

/// Runs overlapping merges from `config.threads` sessions at once.
///
/// Returns the timing result and the log of every finalized commit.
pub fn stress_overlapping_merges(
    store: Arc<ObjectStore>,
    config: &StressConfig,
) -> (StressTestResult, CommitLog) {
    let log: Arc<Mutex<CommitLog>> = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_idx| {
            let store = Arc::clone(&store);
            let log = Arc::clone(&log);
            let config = config.clone();
            thread::spawn(move || {
                let mut rng = XorShift::new(thread_idx as u64 + 1);
                let mut successful = 0usize;
                let mut failed = 0usize;
                let mut session = store.session();

                for i in 0..config.commits_per_thread {
                    let batch = random_batch(&mut rng, &config, &format!("t{thread_idx}c{i}"));
                    stage(&mut session, &batch);

                    let deferred = config.deferred_finalize_every > 0
                        && i % config.deferred_finalize_every == 0;
                    let committed = session
                        .move_from_temp(None, !deferred)
                        .and_then(|outcome| {
                            let tid = outcome.tid();
                            match outcome.into_open() {
                                Some(open) => open.finalize(),
                                None => Ok(tid),
                            }
                        });

                    match committed {
                        Ok(tid) => {
                            log.lock().push((tid, batch));
                            successful += 1;
                        }
                        Err(_) => failed += 1,
                    }
                }
                (successful, failed)
            })
        })
        .collect();

    let mut successful = 0;
    let mut failed = 0;
    for handle in handles {
        let (s, f) = handle.join().expect("stress thread panicked");
        successful += s;
        failed += f;
    }

    let log = std::mem::take(&mut *log.lock());
    (StressTestResult::new(successful, failed, start.elapsed()), log)
}

/// Checks that `store` equals `log` applied serially in tid order, and
/// that no two commits share a tid.
pub fn verify_serial_equivalence(store: &ObjectStore, log: &CommitLog) -> Result<(), String> {
    let mut ordered: Vec<_> = log.iter().collect();
    ordered.sort_by_key(|(tid, _)| *tid);
    if let Some(pair) = ordered.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(format!("{} was handed out twice", pair[0].0));
    }

    let mut model = ReferenceModel::new();
    for (tid, batch) in ordered {
        model.apply(*tid, batch);
    }
    model.check(store)
}
