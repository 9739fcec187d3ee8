//! In-memory storage backend for testing.

use crate::backend::{StorageBackend, UpsertOutcome};
use crate::error::StorageResult;
use crate::tables::Tables;
use deferdb_codec::{Record, Value};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// This backend stores all collections in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use deferdb_codec::{Record, Value};
/// use deferdb_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// let id = Value::from("alice");
/// backend.upsert_fields("users", "id", &id, &Record::new().with("n", 1i64)).unwrap();
/// assert_eq!(backend.find("users", "id", &id).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: RwLock<Tables>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with `records` in `collection`.
    ///
    /// Useful for testing hydration of existing data.
    #[must_use]
    pub fn with_records(collection: &str, records: Vec<Record>) -> Self {
        let backend = Self::new();
        {
            let mut tables = backend.tables.write();
            for record in records {
                tables.insert_raw(collection, record);
            }
        }
        backend
    }

    /// Total number of records across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.tables.read().record_count()
    }

    /// Removes every collection.
    pub fn clear(&self) {
        *self.tables.write() = Tables::default();
    }
}

impl StorageBackend for InMemoryBackend {
    fn find(&self, collection: &str, field: &str, value: &Value) -> StorageResult<Vec<Record>> {
        Ok(self.tables.read().find(collection, field, value))
    }

    fn scan(&self, collection: &str) -> StorageResult<Vec<Record>> {
        Ok(self.tables.read().scan(collection))
    }

    fn upsert_fields(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: &Record,
    ) -> StorageResult<UpsertOutcome> {
        Ok(self.tables.write().upsert(collection, field, value, fields))
    }

    fn remove_where(&self, collection: &str, field: &str, value: &Value) -> StorageResult<usize> {
        Ok(self.tables.write().remove(collection, field, value))
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        Ok(self.tables.read().names())
    }

    fn flush(&self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        Ok(())
    }
}
