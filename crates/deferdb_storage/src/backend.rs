//! Storage backend trait definition.

use crate::error::StorageResult;
use deferdb_codec::{Record, Value};

/// What an upsert did to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record matched; a new one was created.
    Inserted,
    /// An existing record had its fields set.
    Updated,
}

/// A storage connection for deferdb.
///
/// Backends store named collections of [`Record`]s and know nothing about
/// documents, entries, or the transaction queue. All matching is by exact
/// equality of one field.
///
/// # Invariants
///
/// - `upsert_fields` never removes a field: keys absent from `fields` are
///   left as they are on the existing record
/// - `remove_where` with zero matches is a success returning `0`
/// - Reads take `&self` and are safe to run concurrently with writes
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing and ephemeral storage
/// - [`super::FileBackend`] - Persistent, replayed from an operation log
pub trait StorageBackend: Send + Sync {
    /// Returns every record in `collection` whose `field` equals `value`.
    ///
    /// An unknown collection yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find(&self, collection: &str, field: &str, value: &Value) -> StorageResult<Vec<Record>>;

    /// Returns every record in `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn scan(&self, collection: &str) -> StorageResult<Vec<Record>>;

    /// Sets `fields` on the first record whose `field` equals `value`.
    ///
    /// If nothing matches, inserts `fields` with `field: value` added.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be applied or persisted.
    fn upsert_fields(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: &Record,
    ) -> StorageResult<UpsertOutcome>;

    /// Removes every record whose `field` equals `value`.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be applied or persisted.
    fn remove_where(&self, collection: &str, field: &str, value: &Value) -> StorageResult<usize>;

    /// Names of collections holding at least one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn collections(&self) -> StorageResult<Vec<String>>;

    /// Pushes buffered writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;
}
