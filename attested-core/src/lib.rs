//! # Attested Core
//!
//! Signed, timestamped and optionally encrypted attestations on top of an
//! append-only key-value store.
//!
//! ## Key Features
//! - **Canonical CBOR**: every signature is over a reproducible encoding
//! - **Plaintext signatures**: authorship verifies with or without decryption
//! - **Encryption at rest**: ChaCha20-Poly1305 per-subject keys
//! - **Timestamp proofs**: pluggable authority interface
//! - **Atomic list append**: locked read-modify-write, no lost updates

pub mod config;
pub mod crypter;
pub mod crypto;
pub mod error;
pub mod import;
pub mod key;
pub mod reader;
pub mod record;
pub mod serialization;
pub mod store;
pub mod timestamp;
pub mod types;
pub mod writer;

pub use config::{AttestorConfig, ConfigError};
pub use crypter::{decrypt_value, encrypt_value, EncryptionKey};
pub use crypto::Signer;
pub use error::{AttestError, ErrorKind, Result};
pub use import::{load_encryption_key, AssetFiles, ImportError, ImportReport, MetadataImport};
pub use key::{decode_key, encode_key};
pub use reader::{read_attestation, read_record};
pub use record::{Attestation, AttestationPayload, StoredRecord, StoredValue};
pub use store::{Batch, KvTarget, LockError, MemoryStore, Store, StoreError};
pub use timestamp::{LocalTimestamper, TimestampAuthority, TimestampError, TimestampProof};
pub use types::{ContentId, FormatError, Value, ValueKind};
pub use writer::Attestor;

/// Re-export for convenience
pub use ed25519_dalek::{SigningKey, VerifyingKey};
