//! Collection handles.

use crate::database::Shared;
use crate::error::CoreResult;
use crate::transaction::Transaction;
use crate::types::TransactionId;
use deferdb_codec::{Record, Value};
use std::fmt;
use std::sync::Arc;

/// A named collection in a [`crate::Database`].
///
/// Writes do not touch storage: `upsert` and `delete` enqueue a
/// [`Transaction`] for the worker. Reads go straight to the backend and do
/// not see writes still in the queue.
///
/// Handles are cheap to clone.
#[derive(Clone)]
pub struct Collection {
    name: Arc<str>,
    shared: Arc<Shared>,
}

impl Collection {
    pub(crate) fn new(name: &str, shared: Arc<Shared>) -> Self {
        Self {
            name: Arc::from(name),
            shared,
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues an upsert of `record` keyed on `match_field`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `record` lacks `match_field`, or the
    /// queue's error if the transaction is refused.
    pub fn upsert(&self, record: Record, match_field: &str) -> CoreResult<TransactionId> {
        let transaction = Transaction::upsert(self.name(), record, match_field)?;
        self.enqueue(transaction)
    }

    /// Enqueues removal of every record where `field == value`.
    ///
    /// # Errors
    ///
    /// Returns the queue's error if the transaction is refused.
    pub fn delete(&self, field: &str, value: impl Into<Value>) -> CoreResult<TransactionId> {
        self.enqueue(Transaction::delete(self.name(), field, value))
    }

    pub(crate) fn enqueue(&self, transaction: Transaction) -> CoreResult<TransactionId> {
        self.shared.enqueue(transaction)
    }

    /// Stored records where `field == value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn find(&self, field: &str, value: &Value) -> CoreResult<Vec<Record>> {
        Ok(self.shared.backend.find(self.name(), field, value)?)
    }

    /// The first stored record where `field == value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn find_one(&self, field: &str, value: &Value) -> CoreResult<Option<Record>> {
        Ok(self.find(field, value)?.into_iter().next())
    }

    /// Whether any stored record has `field == value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn exists(&self, field: &str, value: &Value) -> CoreResult<bool> {
        Ok(!self.find(field, value)?.is_empty())
    }

    /// Every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn scan(&self) -> CoreResult<Vec<Record>> {
        Ok(self.shared.backend.scan(self.name())?)
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.scan()?.len())
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collection").field(&self.name).finish()
    }
}
