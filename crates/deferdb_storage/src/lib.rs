//! # deferdb Storage
//!
//! Storage backend trait and implementations for deferdb.
//!
//! A backend holds named collections of [`deferdb_codec::Record`]s and
//! offers the handful of operations the transaction worker needs: find by
//! field, `$set`-style upsert on the first match, and removal of every match.
//!
//! ## Design Principles
//!
//! - Backends know nothing about documents, entries, or the queue
//! - Matching is exact equality on a single field
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - Persistent, replayed from a checksummed operation log
//!
//! ## Example
//!
//! ```rust
//! use deferdb_codec::{Record, Value};
//! use deferdb_storage::{InMemoryBackend, StorageBackend, UpsertOutcome};
//!
//! let backend = InMemoryBackend::new();
//! let id = Value::from("a");
//! let outcome = backend.upsert_fields("users", "id", &id, &Record::new()).unwrap();
//! assert_eq!(outcome, UpsertOutcome::Inserted);
//! assert_eq!(backend.remove_where("users", "id", &id).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
pub mod log;
mod memory;
mod tables;

pub use backend::{StorageBackend, UpsertOutcome};
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileOptions, LogReport, RecoveryReport};
pub use log::LogTail;
pub use memory::InMemoryBackend;
