//! Canonical CBOR serialization for signing and storage.
//!
//! Every attestation payload is signed over its canonical encoding, and a
//! reader recomputes that encoding to verify. The byte sequence must therefore
//! be identical for identical values, on every writer and every reader.
//!
//! ## Canonicalization Rules
//! 1. Struct fields in declaration order; map keys in `BTreeMap` order (the
//!    `Ord` of the key type, so `"aa"` precedes `"b"`). This is deterministic
//!    but is not the RFC 8949 length-first key order.
//! 2. Integers encoded in minimal form
//! 3. Floating-point disabled (use fixed-point, integers or text)
//! 4. No indefinite-length encoding

use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("CBOR encoding error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("Non-canonical CBOR: {0}")]
    NonCanonical(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Serialize a value to canonical CBOR bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;

    // Struct fields keep declaration order and maps come from BTreeMap, so
    // ciborium output is already sorted; check the remaining rules.
    verify_canonical(&buf)?;

    Ok(buf)
}

/// Deserialize a value from canonical CBOR bytes.
pub fn from_canonical_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    let value = ciborium::from_reader(bytes)?;
    Ok(value)
}

/// Verify that CBOR bytes are in canonical form.
///
/// Checks for:
/// - No indefinite-length encoding (major type with additional info 31)
/// - No floating-point items (major type 7 with additional info 25..=27)
/// - No trailing bytes after the top-level item
pub fn verify_canonical(bytes: &[u8]) -> Result<()> {
    let mut cursor = std::io::Cursor::new(bytes);
    verify_canonical_item(&mut cursor)?;
    if cursor.position() as usize != bytes.len() {
        return Err(SerializationError::NonCanonical("trailing bytes"));
    }
    Ok(())
}

fn verify_canonical_item<R: Read>(reader: &mut R) -> Result<()> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;

    let major_type = (buf[0] & 0xE0) >> 5;
    let additional_info = buf[0] & 0x1F;

    if additional_info == 31 {
        return Err(SerializationError::NonCanonical(
            "indefinite-length encoding",
        ));
    }
    if major_type == 7 && (25..=27).contains(&additional_info) {
        return Err(SerializationError::NonCanonical("floating-point value"));
    }

    let length = match additional_info {
        0..=23 => additional_info as u64,
        24 => {
            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf)?;
            buf[0] as u64
        }
        25 => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u16::from_be_bytes(buf) as u64
        }
        26 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            u32::from_be_bytes(buf) as u64
        }
        27 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            u64::from_be_bytes(buf)
        }
        _ => return Err(SerializationError::NonCanonical("reserved additional info")),
    };

    match major_type {
        0 | 1 | 7 => {}
        2 | 3 => {
            // Byte/text string content; bounded by what is actually readable
            let copied = std::io::copy(&mut reader.take(length), &mut std::io::sink())?;
            if copied != length {
                return Err(SerializationError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated string",
                )));
            }
        }
        4 => {
            for _ in 0..length {
                verify_canonical_item(reader)?;
            }
        }
        5 => {
            for _ in 0..length {
                verify_canonical_item(reader)?; // Key
                verify_canonical_item(reader)?; // Value
            }
        }
        6 => {
            verify_canonical_item(reader)?;
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        attribute: String,
        count: i64,
        tags: Vec<String>,
    }

    fn payload() -> Payload {
        Payload {
            attribute: "filename".to_string(),
            count: 3,
            tags: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn test_canonical_serialization_deterministic() {
        let bytes1 = to_canonical_cbor(&payload()).unwrap();
        let bytes2 = to_canonical_cbor(&payload()).unwrap();
        assert_eq!(bytes1, bytes2, "Serialization must be deterministic");
    }

    #[test]
    fn test_map_key_ordering() {
        let mut first = BTreeMap::new();
        first.insert("z", 1);
        first.insert("a", 2);

        let mut second = BTreeMap::new();
        second.insert("a", 2);
        second.insert("z", 1);

        assert_eq!(
            to_canonical_cbor(&first).unwrap(),
            to_canonical_cbor(&second).unwrap(),
            "Insertion order must not leak into the encoding"
        );
    }

    #[test]
    fn test_map_keys_in_string_order() {
        let mut map = BTreeMap::new();
        map.insert("b", 1u8);
        map.insert("aa", 2u8);

        // {"aa": 2, "b": 1}: string order, not length-first
        assert_eq!(
            to_canonical_cbor(&map).unwrap(),
            vec![0xa2, 0x62, b'a', b'a', 0x02, 0x61, b'b', 0x01]
        );
    }

    #[test]
    fn test_rejects_floats() {
        let result = to_canonical_cbor(&1.5f64);
        assert!(matches!(result, Err(SerializationError::NonCanonical(_))));
    }

    #[test]
    fn test_rejects_indefinite_length() {
        // Indefinite-length array containing a single 1
        let bytes = [0x9f, 0x01, 0xff];
        assert!(matches!(
            verify_canonical(&bytes),
            Err(SerializationError::NonCanonical(_))
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = to_canonical_cbor(&payload()).unwrap();
        bytes.push(0x00);
        assert!(verify_canonical(&bytes).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<Payload> = from_canonical_cbor(&[0xff, 0x00, 0x13]);
        assert!(result.is_err());
    }
}
