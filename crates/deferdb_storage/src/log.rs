//! Operation log framing for the file backend.
//!
//! Each frame is laid out as:
//!
//! ```text
//! | magic "DLOG" (4) | version u16 LE (2) | len u32 LE (4) | CBOR payload (len) | checksum (4) |
//! ```
//!
//! The checksum is the first four bytes of the SHA-256 digest of header and
//! payload. A frame that is cut short is a torn write and ends the log. A
//! frame with a bad magic or checksum is corruption.

use crate::error::{StorageError, StorageResult};
use deferdb_codec::{from_cbor, to_cbor, Record, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Magic bytes opening every log frame.
pub const LOG_MAGIC: [u8; 4] = *b"DLOG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const HEADER_SIZE: usize = 4 + 2 + 4;
const CHECKSUM_SIZE: usize = 4;

/// A single mutation recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOp {
    /// `$set` of `fields` on the first match, inserting when none.
    Upsert {
        /// Target collection.
        collection: String,
        /// Match field.
        field: String,
        /// Match value.
        value: Value,
        /// Fields to set.
        fields: Record,
    },
    /// Unconditional append of a whole record, written by compaction.
    Insert {
        /// Target collection.
        collection: String,
        /// The record.
        record: Record,
    },
    /// Removal of every match.
    Remove {
        /// Target collection.
        collection: String,
        /// Match field.
        field: String,
        /// Match value.
        value: Value,
    },
}

impl LogOp {
    /// Collection the operation targets.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Upsert { collection, .. }
            | Self::Insert { collection, .. }
            | Self::Remove { collection, .. } => collection,
        }
    }
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

/// Encodes `op` as a complete frame.
///
/// # Errors
///
/// Returns an error if the payload cannot be encoded or exceeds `u32::MAX` bytes.
pub fn encode_frame(op: &LogOp) -> StorageResult<Vec<u8>> {
    let payload = to_cbor(op)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::corrupted("log payload exceeds u32::MAX bytes"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    frame.extend_from_slice(&LOG_MAGIC);
    frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let sum = checksum(&frame);
    frame.extend_from_slice(&sum);
    Ok(frame)
}

/// How a log scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTail {
    /// Every byte belonged to a valid frame.
    Clean,
    /// The last frame was cut short.
    Torn,
    /// A frame failed validation.
    Corrupt(String),
}

/// Result of decoding a log buffer.
#[derive(Debug)]
pub struct DecodedLog {
    /// Operations from every valid frame, in order.
    pub ops: Vec<LogOp>,
    /// Byte length of the valid prefix.
    pub valid_len: u64,
    /// How decoding ended.
    pub tail: LogTail,
}

/// Decodes every valid frame in `bytes`, stopping at the first bad one.
#[must_use]
pub fn decode_log(bytes: &[u8]) -> DecodedLog {
    let mut ops = Vec::new();
    let mut pos = 0usize;

    let tail = loop {
        let rest = &bytes[pos..];
        if rest.is_empty() {
            break LogTail::Clean;
        }
        if rest.len() < HEADER_SIZE {
            break LogTail::Torn;
        }
        if rest[0..4] != LOG_MAGIC {
            break LogTail::Corrupt(format!("invalid magic at offset {pos}"));
        }

        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > LOG_VERSION {
            break LogTail::Corrupt(format!("unsupported version {version} at offset {pos}"));
        }

        let len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let total = HEADER_SIZE + len + CHECKSUM_SIZE;
        if rest.len() < total {
            break LogTail::Torn;
        }

        let body_end = HEADER_SIZE + len;
        if checksum(&rest[..body_end]) != rest[body_end..total] {
            break LogTail::Corrupt(format!("checksum mismatch at offset {pos}"));
        }

        match from_cbor::<LogOp>(&rest[HEADER_SIZE..body_end]) {
            Ok(op) => ops.push(op),
            Err(e) => break LogTail::Corrupt(format!("undecodable frame at offset {pos}: {e}")),
        }
        pos += total;
    };

    DecodedLog {
        ops,
        valid_len: pos as u64,
        tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(id: &str) -> LogOp {
        LogOp::Upsert {
            collection: "users".into(),
            field: "id".into(),
            value: Value::from(id),
            fields: Record::new().with("name", "x"),
        }
    }

    #[test]
    fn decode_empty_is_clean() {
        let log = decode_log(&[]);
        assert!(log.ops.is_empty());
        assert_eq!(log.tail, LogTail::Clean);
    }

    #[test]
    fn decode_multiple_frames() {
        let mut bytes = encode_frame(&upsert("a")).unwrap();
        bytes.extend(
            encode_frame(&LogOp::Remove {
                collection: "users".into(),
                field: "id".into(),
                value: Value::from("a"),
            })
            .unwrap(),
        );

        let log = decode_log(&bytes);
        assert_eq!(log.ops.len(), 2);
        assert_eq!(log.valid_len, bytes.len() as u64);
        assert_eq!(log.tail, LogTail::Clean);
        assert_eq!(log.ops[0], upsert("a"));
    }

    #[test]
    fn decode_torn_tail() {
        let first = encode_frame(&upsert("a")).unwrap();
        let second = encode_frame(&upsert("b")).unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let log = decode_log(&bytes);
        assert_eq!(log.ops.len(), 1);
        assert_eq!(log.valid_len, first.len() as u64);
        assert_eq!(log.tail, LogTail::Torn);
    }

    #[test]
    fn decode_flipped_byte_is_corrupt() {
        let mut bytes = encode_frame(&upsert("a")).unwrap();
        let mid = HEADER_SIZE + 2;
        bytes[mid] ^= 0xFF;

        let log = decode_log(&bytes);
        assert!(log.ops.is_empty());
        assert_eq!(log.valid_len, 0);
        assert!(matches!(log.tail, LogTail::Corrupt(_)));
    }

    #[test]
    fn decode_bad_magic() {
        let mut bytes = encode_frame(&upsert("a")).unwrap();
        bytes[0] = b'X';
        let log = decode_log(&bytes);
        assert!(matches!(log.tail, LogTail::Corrupt(ref m) if m.contains("magic")));
    }

    #[test]
    fn op_collection() {
        assert_eq!(upsert("a").collection(), "users");
    }
}
