//! Engine statistics.
//!
//! Counters are updated by callers (enqueue) and by the worker (execution)
//! and can be read at any time.
//!
//! # Usage
//!
//! ```rust
//! use deferdb_codec::Record;
//! use deferdb_core::Database;
//!
//! let db = Database::open_in_memory().unwrap();
//! db.collection("users")
//!     .upsert(Record::new().with("id", "a"), "id")
//!     .unwrap();
//! db.shutdown().unwrap();
//!
//! let stats = db.stats();
//! assert_eq!(stats.enqueued, 1);
//! assert_eq!(stats.executed, 1);
//! ```

use crate::transaction::ExecOutcome;
use deferdb_storage::UpsertOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Queue counters
    enqueued: AtomicU64,
    rejected: AtomicU64,
    drains: AtomicU64,

    // Execution counters
    executed: AtomicU64,
    failed: AtomicU64,
    upserts_applied: AtomicU64,
    inserted: AtomicU64,
    deletes_applied: AtomicU64,
    records_removed: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self, outcome: ExecOutcome) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ExecOutcome::Upserted(kind) => {
                self.upserts_applied.fetch_add(1, Ordering::Relaxed);
                if kind == UpsertOutcome::Inserted {
                    self.inserted.fetch_add(1, Ordering::Relaxed);
                }
            }
            ExecOutcome::Deleted(removed) => {
                self.deletes_applied.fetch_add(1, Ordering::Relaxed);
                self.records_removed
                    .fetch_add(removed as u64, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions accepted by `enqueue`.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Transactions refused because the queue was full or closed.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Transactions executed successfully.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Transactions whose storage call failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued(),
            rejected: self.rejected(),
            executed: self.executed(),
            failed: self.failed(),
            upserts_applied: self.upserts_applied.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            deletes_applied: self.deletes_applied.load(Ordering::Relaxed),
            records_removed: self.records_removed.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Transactions accepted by `enqueue`.
    pub enqueued: u64,
    /// Transactions refused at enqueue.
    pub rejected: u64,
    /// Transactions executed successfully.
    pub executed: u64,
    /// Transactions whose storage call failed.
    pub failed: u64,
    /// Successful upserts.
    pub upserts_applied: u64,
    /// Upserts that created a record.
    pub inserted: u64,
    /// Successful deletes.
    pub deletes_applied: u64,
    /// Records removed by deletes.
    pub records_removed: u64,
    /// Non-empty drains performed by the worker.
    pub drains: u64,
}

impl StatsSnapshot {
    /// Transactions that have left the queue, either way.
    #[must_use]
    pub fn settled(&self) -> u64 {
        self.executed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = EngineStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_outcomes() {
        let stats = EngineStats::new();
        stats.record_executed(ExecOutcome::Upserted(UpsertOutcome::Inserted));
        stats.record_executed(ExecOutcome::Upserted(UpsertOutcome::Updated));
        stats.record_executed(ExecOutcome::Deleted(3));
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.executed, 3);
        assert_eq!(snap.upserts_applied, 2);
        assert_eq!(snap.inserted, 1);
        assert_eq!(snap.deletes_applied, 1);
        assert_eq!(snap.records_removed, 3);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.settled(), 4);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(EngineStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_enqueue();
                    s.record_rejected();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.enqueued(), 1000);
        assert_eq!(stats.rejected(), 1000);
    }
}
