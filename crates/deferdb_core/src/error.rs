//! Error types for deferdb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in deferdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] deferdb_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] deferdb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The call needs a backing collection or owning document it does not have.
    #[error("illegal state: {message}")]
    IllegalState {
        /// What was missing.
        message: String,
    },

    /// A claimed identity already exists in storage.
    #[error("identity collision: {field} = {value} already exists in {collection}")]
    IdentityCollision {
        /// Collection that was checked.
        collection: String,
        /// Identity field.
        field: String,
        /// The claimed value.
        value: String,
    },

    /// A stored record does not have the shape a document expects.
    #[error("malformed record in {context}: {message}")]
    MalformedRecord {
        /// Where the record came from.
        context: String,
        /// What was wrong with it.
        message: String,
    },

    /// Database is shut down and accepts no more writes.
    #[error("database is closed")]
    DatabaseClosed,

    /// The pending queue is at its configured capacity.
    #[error("transaction queue is full ({capacity} pending)")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an identity collision error.
    pub fn identity_collision(
        collection: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::IdentityCollision {
            collection: collection.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a malformed record error.
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Whether this error came from the storage layer.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}
