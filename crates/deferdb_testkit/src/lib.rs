//! # deferdb Testkit
//!
//! Test utilities for deferdb.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - A fault-injecting storage backend for fail-forward tests
//! - Property-based generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use deferdb_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let players = db.collection("players");
//!     players.upsert(deferdb_core::Record::new().with("id", "p1"), "id").unwrap();
//!     db.shutdown().unwrap();
//!     assert_eq!(players.count().unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
