//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record or log frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] deferdb_codec::CodecError),

    /// The operation log is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the storage lock.
    #[error("storage locked: {0}")]
    Locked(String),

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,

    /// A failure injected by a test harness.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates an injected failure, used by fault-injecting backends.
    pub fn injected(message: impl Into<String>) -> Self {
        Self::Injected(message.into())
    }
}
