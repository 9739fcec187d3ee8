//! # deferdb Core
//!
//! Write-behind document engine for deferdb.
//!
//! This crate provides:
//! - A transaction queue drained by one background worker per database
//! - Collection handles whose writes enqueue instead of touching storage
//! - Documents composed of entries, serialized into one record per save
//! - Unique documents with generated, claimed, or hydrated identities
//! - Permission node entries and the group/user records built from them
//!
//! Writes return once queued. The worker applies them in drain order and
//! reports failures to the log and the failure feed, never to the caller.
//! `shutdown` drains everything accepted before stopping.
//!
//! ## Example
//!
//! ```rust
//! use deferdb_core::{Database, NodeDocument};
//!
//! let db = Database::open_in_memory().unwrap();
//! let groups = db.collection("groups");
//!
//! let admins = NodeDocument::claim(&groups, "admins").unwrap();
//! admins.set_node("server.kick", true, false).unwrap();
//! admins.set_node("server.ban", true, true).unwrap();
//!
//! db.shutdown().unwrap();
//! let record = groups.find_one("id", admins.identity_value()).unwrap().unwrap();
//! let loaded = NodeDocument::hydrate(&groups, &record).unwrap();
//! assert_eq!(loaded.flag_for("SERVER.KICK"), Some(true));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod document;
mod error;
mod failures;
pub mod permissions;
mod queue;
mod stats;
mod transaction;
mod types;
mod worker;

pub use collection::Collection;
pub use config::Config;
pub use database::Database;
pub use document::{
    Document, Entry, EntryLink, IdentityOrigin, NodeDocument, NodeEntry, UniqueDocument, UniqueId,
    NODE_ENTRY_NAME, UNIQUE_ID_FIELD,
};
pub use error::{CoreError, CoreResult};
pub use failures::{FailedTransaction, FailureFeed};
pub use queue::TransactionQueue;
pub use stats::{EngineStats, StatsSnapshot};
pub use transaction::{ExecOutcome, Transaction, TransactionOp};
pub use types::{TransactionId, TransactionKind};

pub use deferdb_codec::{Record, Value};
pub use deferdb_storage::{FileOptions, RecoveryReport, StorageBackend};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
