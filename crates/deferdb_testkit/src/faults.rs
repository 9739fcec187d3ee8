//! Fault injection for fail-forward testing.
//!
//! [`FaultyBackend`] wraps another backend and fails writes on demand, so
//! tests can check that a failed transaction is logged, counted, and
//! skipped while the rest of the queue still drains.
//!
//! ## Usage
//!
//! ```rust
//! use deferdb_core::{Database, Record};
//! use deferdb_testkit::faults::FaultyBackend;
//! use std::sync::Arc;
//!
//! let backend = Arc::new(FaultyBackend::in_memory());
//! let db = Database::open(backend.clone()).unwrap();
//!
//! backend.fail_collection("broken");
//! db.collection("broken").upsert(Record::new().with("id", 1i64), "id").unwrap();
//! db.collection("fine").upsert(Record::new().with("id", 1i64), "id").unwrap();
//! db.shutdown().unwrap();
//!
//! assert_eq!(db.stats().failed, 1);
//! assert_eq!(db.collection("fine").count().unwrap(), 1);
//! ```

use deferdb_codec::{Record, Value};
use deferdb_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult, UpsertOutcome};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Kinds of write a [`FaultyBackend`] sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// `upsert_fields`.
    Upsert,
    /// `remove_where`.
    Remove,
}

/// One write as seen by a [`FaultyBackend`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Upsert or remove.
    pub kind: WriteKind,
    /// Target collection.
    pub collection: String,
    /// Match field.
    pub field: String,
    /// Match value.
    pub value: Value,
    /// Whether the write was failed by injection.
    pub injected: bool,
}

/// A storage backend wrapper that fails writes on demand.
pub struct FaultyBackend {
    inner: Arc<dyn StorageBackend>,
    fail_writes: AtomicBool,
    fail_after: AtomicUsize,
    writes_seen: AtomicUsize,
    closed: AtomicBool,
    fail_flush: AtomicBool,
    failing_collections: Mutex<BTreeSet<String>>,
    latency: Mutex<Option<Duration>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl FaultyBackend {
    /// Wraps `inner`. No faults are armed.
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_after: AtomicUsize::new(usize::MAX),
            writes_seen: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            failing_collections: Mutex::new(BTreeSet::new()),
            latency: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Wraps a fresh [`InMemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Fails every write while `fail` is true.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Lets `count` more writes through, then fails every write after.
    pub fn fail_after(&self, count: usize) {
        let seen = self.writes_seen.load(Ordering::SeqCst);
        self.fail_after
            .store(seen.saturating_add(count), Ordering::SeqCst);
    }

    /// Fails every write to `collection`.
    pub fn fail_collection(&self, collection: &str) {
        self.failing_collections.lock().insert(collection.to_string());
    }

    /// Makes every call, reads included, fail with [`StorageError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Fails `flush` while `fail` is true.
    pub fn set_fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Sleeps for `latency` before every write.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Disarms every fault. The write log is kept.
    pub fn reset(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
        self.fail_after.store(usize::MAX, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        self.fail_flush.store(false, Ordering::SeqCst);
        self.failing_collections.lock().clear();
        *self.latency.lock() = None;
    }

    /// Every write seen so far.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    /// Number of writes failed by injection.
    pub fn injected_count(&self) -> usize {
        self.writes.lock().iter().filter(|w| w.injected).count()
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &Arc<dyn StorageBackend> {
        &self.inner
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn before_write(
        &self,
        kind: WriteKind,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StorageResult<()> {
        self.check_open()?;
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            thread::sleep(latency);
        }

        let seen = self.writes_seen.fetch_add(1, Ordering::SeqCst);
        let fault = if self.fail_writes.load(Ordering::SeqCst) {
            Some("write failure armed".to_string())
        } else if seen >= self.fail_after.load(Ordering::SeqCst) {
            Some(format!("write #{seen} past the failure threshold"))
        } else if self.failing_collections.lock().contains(collection) {
            Some(format!("collection '{collection}' is failing"))
        } else {
            None
        };

        self.writes.lock().push(WriteRecord {
            kind,
            collection: collection.to_string(),
            field: field.to_string(),
            value: value.clone(),
            injected: fault.is_some(),
        });

        match fault {
            Some(message) => Err(StorageError::injected(message)),
            None => Ok(()),
        }
    }
}

impl StorageBackend for FaultyBackend {
    fn find(&self, collection: &str, field: &str, value: &Value) -> StorageResult<Vec<Record>> {
        self.check_open()?;
        self.inner.find(collection, field, value)
    }

    fn scan(&self, collection: &str) -> StorageResult<Vec<Record>> {
        self.check_open()?;
        self.inner.scan(collection)
    }

    fn upsert_fields(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: &Record,
    ) -> StorageResult<UpsertOutcome> {
        self.before_write(WriteKind::Upsert, collection, field, value)?;
        self.inner.upsert_fields(collection, field, value, fields)
    }

    fn remove_where(&self, collection: &str, field: &str, value: &Value) -> StorageResult<usize> {
        self.before_write(WriteKind::Remove, collection, field, value)?;
        self.inner.remove_where(collection, field, value)
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        self.check_open()?;
        self.inner.collections()
    }

    fn flush(&self) -> StorageResult<()> {
        self.check_open()?;
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(StorageError::injected("flush failure armed"));
        }
        self.inner.flush()
    }
}
