//! Database facade.
//!
//! The `Database` owns the storage connection, the transaction queue and
//! the worker thread. The worker starts in `open` and stops in `shutdown`
//! once every accepted transaction has run.

use crate::collection::Collection;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::failures::{FailedTransaction, FailureFeed};
use crate::queue::TransactionQueue;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::transaction::Transaction;
use crate::types::TransactionId;
use crate::worker;
use deferdb_storage::{FileBackend, InMemoryBackend, RecoveryReport, StorageBackend};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// State shared by the database, its collection handles, and the worker.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) queue: TransactionQueue,
    pub(crate) stats: EngineStats,
    pub(crate) failures: FailureFeed,
}

impl Shared {
    pub(crate) fn enqueue(&self, transaction: Transaction) -> CoreResult<TransactionId> {
        let collection = transaction.collection().to_string();
        match self.queue.push(transaction) {
            Ok(id) => {
                self.stats.record_enqueue();
                Ok(id)
            }
            Err(err) => {
                self.stats.record_rejected();
                warn!(collection = %collection, error = %err, "transaction rejected");
                Err(err)
            }
        }
    }
}

/// The main database handle.
///
/// # Example
///
/// ```rust
/// use deferdb_codec::{Record, Value};
/// use deferdb_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// let users = db.collection("users");
///
/// users.upsert(Record::new().with("id", "alice").with("n", 1i64), "id").unwrap();
/// users.upsert(Record::new().with("id", "alice").with("n", 2i64), "id").unwrap();
///
/// // Drains the queue before stopping the worker.
/// db.shutdown().unwrap();
///
/// let alice = users.find_one("id", &Value::from("alice")).unwrap().unwrap();
/// assert_eq!(alice.get("n"), Some(&Value::Integer(2)));
/// ```
///
/// # Shutdown
///
/// `shutdown` is idempotent and also runs when the database is dropped.
/// Collection handles and documents that outlive it get `DatabaseClosed`
/// on their next write.
pub struct Database {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    recovery: Option<RecoveryReport>,
}

impl Database {
    /// Opens a database over `backend` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn open(backend: Arc<dyn StorageBackend>) -> CoreResult<Self> {
        Self::open_with_config(backend, Config::default())
    }

    /// Opens a database over `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn open_with_config(backend: Arc<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        Self::start(backend, config, None)
    }

    /// Opens an ephemeral database backed by memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(Arc::new(InMemoryBackend::new()))
    }

    /// Opens a database persisted in the operation log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or is locked by another
    /// handle, or if the worker thread cannot be spawned.
    pub fn open_file(path: &Path) -> CoreResult<Self> {
        Self::open_file_with_config(path, Config::default())
    }

    /// Opens a database persisted at `path` with custom configuration.
    ///
    /// `config.file` controls syncing and directory creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or is locked by another
    /// handle, or if the worker thread cannot be spawned.
    pub fn open_file_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let backend = FileBackend::open_with_options(path, config.file)?;
        let recovery = backend.recovery().clone();
        if !recovery.is_clean() {
            warn!(
                path = %path.display(),
                applied = recovery.applied,
                discarded_bytes = recovery.discarded_bytes,
                "log tail discarded during recovery"
            );
        }
        Self::start(Arc::new(backend), config, Some(recovery))
    }

    fn start(
        backend: Arc<dyn StorageBackend>,
        config: Config,
        recovery: Option<RecoveryReport>,
    ) -> CoreResult<Self> {
        let shared = Arc::new(Shared {
            queue: TransactionQueue::new(config.queue_capacity),
            failures: FailureFeed::with_max_history(config.failure_history),
            stats: EngineStats::new(),
            backend,
            config,
        });
        let handle = worker::spawn(Arc::clone(&shared))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            recovery,
        })
    }

    /// Returns a handle to the named collection.
    ///
    /// Collections exist implicitly; nothing is written until the first
    /// upsert drains.
    #[must_use]
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(name, Arc::clone(&self.shared))
    }

    /// Names of collections holding at least one stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.shared.backend.collections()?)
    }

    /// Appends `transaction` to the queue.
    ///
    /// Never blocks on storage I/O.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after shutdown, or `QueueFull` when a
    /// capacity is configured and reached.
    pub fn enqueue(&self, transaction: Transaction) -> CoreResult<TransactionId> {
        self.shared.enqueue(transaction)
    }

    /// Transactions accepted but not yet executed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.queue.pending_count()
    }

    /// Blocks until every accepted transaction has executed or `timeout`
    /// elapses. Returns whether the queue was idle.
    #[must_use]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.queue.wait_idle(timeout)
    }

    /// Stops the worker after it drains the queue, then flushes storage.
    ///
    /// Blocks until the worker has exited. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked or the flush fails.
    pub fn shutdown(&self) -> CoreResult<()> {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return Ok(());
        };

        info!(pending = self.pending_count(), "shutting down");
        self.shared.queue.begin_shutdown();
        handle
            .join()
            .map_err(|_| CoreError::illegal_state("worker thread panicked"))?;

        self.shared.backend.flush()?;
        info!(stats = ?self.stats(), "shutdown complete");
        Ok(())
    }

    /// Whether the worker has stopped accepting work.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.is_disconnected()
    }

    /// Returns a snapshot of engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Subscribes to transactions whose storage call fails from now on.
    pub fn subscribe_failures(&self) -> Receiver<FailedTransaction> {
        self.shared.failures.subscribe()
    }

    /// Recently failed transactions, oldest first.
    #[must_use]
    pub fn recent_failures(&self) -> Vec<FailedTransaction> {
        self.shared.failures.recent()
    }

    /// What log replay found, for file-backed databases.
    #[must_use]
    pub fn recovery(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The storage connection writes are executed against.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.shared.backend
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "shutdown on drop failed");
        }
    }
}
