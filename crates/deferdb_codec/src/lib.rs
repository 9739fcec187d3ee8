//! # deferdb Codec
//!
//! Record values and canonical CBOR encoding for deferdb.
//!
//! Documents are persisted as [`Record`]s: sorted maps from field name to a
//! dynamic [`Value`]. The same types travel through the transaction queue,
//! the storage backends, and the on-disk operation log.
//!
//! ## Usage
//!
//! ```
//! use deferdb_codec::{from_cbor, to_cbor, Record, Value};
//!
//! let record = Record::new().with("id", "alice").with("n", 3i64);
//! let bytes = to_cbor(&record).unwrap();
//! let decoded: Record = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded.get("n"), Some(&Value::Integer(3)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod record;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use record::Record;
pub use value::Value;
