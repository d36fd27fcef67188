//! Stress helpers for ModernIDB.
//!
//! These run single-shot helpers from several threads at once. Overlapping
//! read-write transactions finish each other, so a writer can lose its
//! transaction to a neighbour; failures are counted, not treated as bugs.

use crate::fixtures::Item;
use modernidb::ModernIdb;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
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
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
        }
    }
}

fn run_threads(
    db: &ModernIdb,
    config: &StressConfig,
    op: impl Fn(&ModernIdb, usize, usize) -> bool + Send + Sync + 'static,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let op = Arc::new(op);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = db.clone();
            let op = Arc::clone(&op);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            thread::spawn(move || {
                for i in 0..operations {
                    if op(&db, t, i) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Puts distinct catalog items (`t{thread}-{i}`) from every thread.
pub fn stress_concurrent_puts(db: &ModernIdb, config: &StressConfig) -> StressTestResult {
    run_threads(db, config, |db, t, i| {
        let item = Item::new(&format!("t{t}-{i}"), "stress", u32::try_from(i).unwrap_or(0));
        db.put_to_store("items", &item, None).is_ok()
    })
}

/// Reads `id` from every thread through `get_from_store`. A missing record
/// counts as a failure.
pub fn stress_concurrent_reads(db: &ModernIdb, id: &str, config: &StressConfig) -> StressTestResult {
    let id = id.to_owned();
    run_threads(db, config, move |db, _, _| {
        matches!(db.get_from_store::<Item>("items", id.as_str()), Ok(Some(_)))
    })
}
