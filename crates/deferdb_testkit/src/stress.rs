//! Stress tests for deferdb.
//!
//! These drive many writers against one database and check that the
//! worker drains everything they enqueued.

use deferdb_core::{Database, NodeDocument, Record};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations attempted.
    pub total_ops: usize,
    /// Operations accepted by the queue.
    pub successful_ops: usize,
    /// Operations refused at enqueue.
    pub failed_ops: usize,
    /// Time from the first enqueue until the queue settled.
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

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Accepted: {}", self.successful_ops);
        println!("Refused: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per writer thread.
    pub operations: usize,
    /// Number of concurrent writer threads.
    pub threads: usize,
    /// Number of distinct record ids writers cycle through.
    pub key_space: usize,
    /// Collection written to.
    pub collection: String,
    /// How long to wait for the queue to settle.
    pub settle_timeout: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            key_space: 100,
            collection: "stress".to_string(),
            settle_timeout: Duration::from_secs(30),
        }
    }
}

fn wait_settled(db: &Database, config: &StressConfig) {
    assert!(
        db.wait_idle(config.settle_timeout),
        "queue did not settle within {:?}",
        config.settle_timeout
    );
}

/// Upserts `operations` records from one thread, cycling through the key
/// space, and waits for the queue to settle.
pub fn stress_sequential_upserts(db: &Database, config: &StressConfig) -> StressTestResult {
    let collection = db.collection(&config.collection);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let record = Record::new()
            .with("id", format!("key-{}", i % config.key_space))
            .with("seq", i as i64);
        match collection.upsert(record, "id") {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    wait_settled(db, config);
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Upserts from `threads` writers at once. Each writer owns its own keys,
/// so the final `seq` of every key is the writer's last value.
pub fn stress_concurrent_upserts(db: &Arc<Database>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|writer| {
            let collection = db.collection(&config.collection);
            let operations = config.operations;
            let key_space = config.key_space;
            thread::spawn(move || {
                let mut successful = 0usize;
                let mut failed = 0usize;
                for i in 0..operations {
                    let record = Record::new()
                        .with("id", format!("w{writer}-key-{}", i % key_space))
                        .with("writer", writer as i64)
                        .with("seq", i as i64);
                    match collection.upsert(record, "id") {
                        Ok(_) => successful += 1,
                        Err(_) => failed += 1,
                    }
                }
                (successful, failed)
            })
        })
        .collect();

    let (successful, failed) = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread panicked"))
        .fold((0, 0), |(s, f), (ds, df)| (s + ds, f + df));

    wait_settled(db, config);
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Saves `operations` node documents, each with a few nodes, and waits for
/// the queue to settle.
pub fn stress_document_saves(db: &Database, config: &StressConfig) -> StressTestResult {
    let collection = db.collection(&config.collection);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let saved = NodeDocument::generate(&collection).and_then(|document| {
            document.set_node(&format!("node.{}", i % 7), i % 2 == 0, false)?;
            document.set_node("node.common", true, false)?;
            document.save()
        });
        match saved {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    wait_settled(db, config);
    StressTestResult::new(successful, failed, start.elapsed())
}
