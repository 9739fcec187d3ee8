//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use deferdb_core::{Config, Database};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// File name of the operation log inside a fixture's temp directory.
pub const LOG_FILE_NAME: &str = "store.dlog";

/// How long fixtures wait for the worker before giving up.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates a new in-memory test database with `config`.
    pub fn memory_with_config(config: Config) -> Self {
        let backend = std::sync::Arc::new(deferdb_storage::InMemoryBackend::new());
        Self {
            db: Database::open_with_config(backend, config)
                .expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-backed test database in a fresh temp directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_file(&temp_dir.path().join(LOG_FILE_NAME))
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the log path if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_ref()
            .map(|dir| dir.path().join(LOG_FILE_NAME))
    }

    /// Shuts the database down and opens it again from the same log.
    ///
    /// Panics for in-memory databases, which have nothing to reopen, and
    /// if collection or document handles from the old database are still
    /// alive, since they keep the log locked.
    pub fn reopen(self) -> Self {
        let Self { db, temp_dir } = self;
        let temp_dir = temp_dir.expect("Only file databases can be reopened");
        db.shutdown().expect("Failed to shut down database");
        drop(db);

        let db = Database::open_file(&temp_dir.path().join(LOG_FILE_NAME))
            .expect("Failed to reopen file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Waits for the worker to settle, panicking on timeout.
    pub fn settle(&self) {
        assert!(
            self.db.wait_idle(IDLE_TIMEOUT),
            "worker did not settle within {IDLE_TIMEOUT:?}"
        );
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use deferdb_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     assert_eq!(db.pending_count(), 0);
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-backed database and its log path.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use deferdb_core::{NodeDocument, Record};

    /// Creates a database whose `name` collection holds `count` records
    /// `{id: "record-<i>", index: <i>}`, already drained.
    pub fn populated_database(name: &str, count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let collection = test_db.collection(name);

        for i in 0..count {
            let record = Record::new()
                .with("id", format!("record-{i}"))
                .with("index", i as i64);
            collection
                .upsert(record, "id")
                .expect("Failed to enqueue upsert");
        }

        test_db.settle();
        test_db
    }

    /// Creates a database with one saved node document per name in
    /// `groups`, each carrying the given nodes.
    pub fn node_groups(
        collection: &str,
        groups: &[&str],
        nodes: &[(&str, bool)],
    ) -> (TestDatabase, Vec<NodeDocument>) {
        let test_db = TestDatabase::memory();
        let handle = test_db.collection(collection);

        let documents = groups
            .iter()
            .map(|group| {
                let document =
                    NodeDocument::claim(&handle, group).expect("Failed to claim group id");
                for (node, flag) in nodes {
                    document
                        .set_node(node, *flag, false)
                        .expect("Failed to set node");
                }
                document.save().expect("Failed to save group");
                document
            })
            .collect();

        test_db.settle();
        (test_db, documents)
    }
}
