//! Core types used across the attestation write path.

use cid::{Cid, Version};
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SHA-256 hash (32 bytes)
pub type Hash256 = [u8; 32];

/// Ed25519 signature (64 bytes) - wrapped for Serde support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBytes(#[serde(with = "bytes::array64")] pub [u8; 64]);

impl From<[u8; 64]> for SignatureBytes {
    fn from(bytes: [u8; 64]) -> Self {
        SignatureBytes(bytes)
    }
}

impl From<ed25519_dalek::Signature> for SignatureBytes {
    fn from(signature: ed25519_dalek::Signature) -> Self {
        SignatureBytes(signature.to_bytes())
    }
}

impl AsRef<[u8; 64]> for SignatureBytes {
    fn as_ref(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Serde helpers that encode binary data as CBOR byte strings instead of
/// arrays of integers.
pub(crate) mod bytes {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    struct ByteBufVisitor;

    impl<'de> Visitor<'de> for ByteBufVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a byte string")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_byte_buf(ByteBufVisitor)
    }

    pub mod array64 {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_bytes(bytes)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
            let bytes = super::deserialize(deserializer)?;
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("Invalid signature length"))
        }
    }

    pub mod array32 {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_bytes(bytes)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
            let bytes = super::deserialize(deserializer)?;
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("Invalid digest length"))
        }
    }
}

/// Errors raised while parsing identifiers and keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Empty content identifier")]
    Empty,

    #[error("Unsupported multibase prefix: {0:?}")]
    UnsupportedMultibase(char),

    #[error("Unsupported CID version: {0}")]
    UnsupportedVersion(u64),

    #[error("Invalid content identifier: {0}")]
    InvalidCid(String),

    #[error("Trailing bytes after content identifier")]
    TrailingBytes,

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Record stored under {key} belongs to {found}")]
    KeyMismatch { key: String, found: String },
}

impl From<cid::Error> for FormatError {
    fn from(err: cid::Error) -> Self {
        FormatError::InvalidCid(err.to_string())
    }
}

/// Multicodec code for raw binary blocks.
pub const CODEC_RAW: u64 = 0x55;

/// Multihash code for SHA2-256.
pub const MULTIHASH_SHA2_256: u64 = 0x12;

/// Content identifier. Always a CIDv1; the textual form is the multibase
/// base32 rendering (`b` prefix, lowercase, unpadded).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(Cid);

impl ContentId {
    /// Parse the base32 multibase string form of a CIDv1.
    pub fn parse(s: &str) -> Result<Self, FormatError> {
        let prefix = s.chars().next().ok_or(FormatError::Empty)?;
        let cid = Cid::try_from(s)?;
        if cid.version() == Version::V0 {
            return Err(FormatError::UnsupportedVersion(0));
        }
        if !matches!(prefix, 'b' | 'B') {
            return Err(FormatError::UnsupportedMultibase(prefix));
        }
        Ok(Self(cid))
    }

    /// Decode the binary form of a CIDv1.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.is_empty() {
            return Err(FormatError::Empty);
        }
        let cid = Cid::try_from(bytes)?;
        if cid.version() == Version::V0 {
            return Err(FormatError::UnsupportedVersion(0));
        }
        if cid.to_bytes().len() != bytes.len() {
            return Err(FormatError::TrailingBytes);
        }
        Ok(Self(cid))
    }

    /// Identifier of a single raw block hashed with SHA2-256.
    ///
    /// Matches what chunking importers produce for inputs that fit in one
    /// chunk; larger inputs are DAG-encoded and are out of scope here.
    pub fn for_raw_block(data: &[u8]) -> Self {
        Self(Cid::new_v1(CODEC_RAW, Code::Sha2_256.digest(data)))
    }

    /// Binary form (`version | codec | multihash`).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Multicodec of the content.
    pub fn codec(&self) -> u64 {
        self.0.codec()
    }

    /// Multihash function code.
    pub fn hash_code(&self) -> u64 {
        self.0.hash().code()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self)
    }
}

impl FromStr for ContentId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bytes::serialize(&self.0.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = bytes::deserialize(deserializer)?;
        ContentId::from_bytes(&raw).map_err(serde::de::Error::custom)
    }
}

/// Logical type of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Scalar,
    List,
    Structured,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar => write!(f, "scalar"),
            ValueKind::List => write!(f, "list"),
            ValueKind::Structured => write!(f, "structured"),
        }
    }
}

/// An attribute value. Carries its own logical type.
///
/// There is no floating point variant: every value has exactly one canonical
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Bytes(#[serde(with = "bytes")] Vec<u8>),
    Cid(ContentId),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Structured,
            _ => ValueKind::Scalar,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ContentId> for Value {
    fn from(cid: ContentId) -> Self {
        Value::Cid(cid)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}
