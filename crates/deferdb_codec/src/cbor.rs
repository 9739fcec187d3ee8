//! Canonical CBOR encoding through ciborium.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// Output is deterministic for [`crate::Record`] and [`crate::Value`]:
/// map keys come out sorted and integers use the shortest encoding.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Record, Value};

    #[test]
    fn record_encoding_is_deterministic() {
        let a = Record::new().with("z", 1i64).with("a", "x");
        let b = Record::new().with("a", "x").with("z", 1i64);
        assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
    }

    #[test]
    fn nested_record_decodes() {
        let record = Record::new()
            .with("id", "u1")
            .with("cleared", Value::Null)
            .with(
                "nodes",
                vec![Value::from(Record::new().with("name", "a.b").with("flag", "1"))],
            );
        let bytes = to_cbor(&record).unwrap();
        let decoded: Record = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn large_unsigned_is_rejected() {
        let bytes = to_cbor(&u64::MAX).unwrap();
        assert!(from_cbor::<Value>(&bytes).is_err());
    }

    #[test]
    fn floats_are_rejected() {
        let bytes = to_cbor(&1.5f64).unwrap();
        assert!(from_cbor::<Value>(&bytes).is_err());
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            from_cbor::<Record>(&[0xff, 0x00]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }
}
