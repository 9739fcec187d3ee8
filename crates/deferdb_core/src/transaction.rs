//! Queued units of work.
//!
//! A [`Transaction`] is immutable once built. The queue owns it from
//! enqueue until the worker has executed it, then it is dropped.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionKind;
use deferdb_codec::{Record, Value};
use deferdb_storage::{StorageBackend, UpsertOutcome};

/// The write a transaction performs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOp {
    /// Set every field of `record` on the record whose `match_field` equals
    /// `record[match_field]`, inserting when none matches.
    Upsert {
        /// Full serialized fields, including the match field.
        record: Record,
        /// Field used to find the existing record.
        match_field: String,
    },
    /// Remove every record whose `match_field` equals `match_value`.
    Delete {
        /// Field to match on.
        match_field: String,
        /// Value to match.
        match_value: Value,
    },
}

/// What executing a transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// An upsert inserted or updated a record.
    Upserted(UpsertOutcome),
    /// A delete removed this many records.
    Deleted(usize),
}

/// One queued write or delete bound to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    collection: String,
    op: TransactionOp,
}

impl Transaction {
    /// Builds an upsert of `record` keyed on `match_field`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `record` has no value, or a null value,
    /// for `match_field`.
    pub fn upsert(
        collection: impl Into<String>,
        record: Record,
        match_field: impl Into<String>,
    ) -> CoreResult<Self> {
        let match_field = match_field.into();
        match record.get(&match_field) {
            Some(value) if !value.is_null() => {}
            _ => {
                return Err(CoreError::invalid_operation(format!(
                    "upsert record has no value for match field '{match_field}'"
                )))
            }
        }
        Ok(Self {
            collection: collection.into(),
            op: TransactionOp::Upsert {
                record,
                match_field,
            },
        })
    }

    /// Builds a delete of every record where `match_field == match_value`.
    pub fn delete(
        collection: impl Into<String>,
        match_field: impl Into<String>,
        match_value: impl Into<Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            op: TransactionOp::Delete {
                match_field: match_field.into(),
                match_value: match_value.into(),
            },
        }
    }

    /// Target collection.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The operation carried.
    #[must_use]
    pub fn op(&self) -> &TransactionOp {
        &self.op
    }

    /// Upsert or delete.
    #[must_use]
    pub fn kind(&self) -> TransactionKind {
        match self.op {
            TransactionOp::Upsert { .. } => TransactionKind::Upsert,
            TransactionOp::Delete { .. } => TransactionKind::Delete,
        }
    }

    /// Runs the operation against `backend`.
    ///
    /// The upsert match value is read from the record at this point rather
    /// than captured separately at enqueue.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, which the worker reports and discards.
    pub fn execute(&self, backend: &dyn StorageBackend) -> CoreResult<ExecOutcome> {
        match &self.op {
            TransactionOp::Upsert {
                record,
                match_field,
            } => {
                let value = record.get(match_field).ok_or_else(|| {
                    CoreError::invalid_operation(format!(
                        "upsert record lost match field '{match_field}'"
                    ))
                })?;
                let outcome = backend.upsert_fields(&self.collection, match_field, value, record)?;
                Ok(ExecOutcome::Upserted(outcome))
            }
            TransactionOp::Delete {
                match_field,
                match_value,
            } => {
                let removed = backend.remove_where(&self.collection, match_field, match_value)?;
                Ok(ExecOutcome::Deleted(removed))
            }
        }
    }
}
