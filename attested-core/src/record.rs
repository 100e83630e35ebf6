//! Attestation payloads and the records written to the store.
//!
//! ## Signing
//! The signature always covers the *plaintext* payload
//! `{cid, attribute, value, encrypted}`, encoded as canonical CBOR. A reader
//! that holds the decryption key recomputes exactly that encoding; a reader
//! without it can still see the `encrypted` flag and the signer.
//!
//! ## Stored form
//! ```text
//! StoredRecord {
//!     attestation: { cid, attribute, body: Plain(value) | Encrypted(bytes) },
//!     signature,   // over the plaintext payload
//!     timestamp,   // over SignedPayload { payload, signature }
//! }
//! ```

use crate::crypto::{Signer, VerifyingKey};
use crate::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use crate::timestamp::TimestampProof;
use crate::types::{bytes, ContentId, SignatureBytes, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The signed statement: `cid` has `attribute` = `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationPayload {
    #[serde(rename = "CID")]
    pub cid: ContentId,
    pub attribute: String,
    pub value: Value,
    pub encrypted: bool,
}

impl AttestationPayload {
    pub fn new(cid: ContentId, attribute: impl Into<String>, value: Value, encrypted: bool) -> Self {
        Self {
            cid,
            attribute: attribute.into(),
            value,
            encrypted,
        }
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(self)
    }

    pub fn sign(&self, signer: &Signer) -> Result<SignatureBytes, SerializationError> {
        let message = self.signing_bytes()?;
        Ok(SignatureBytes::from(signer.sign(&message)))
    }

    /// Verify `signature` over this payload.
    pub fn verify(
        &self,
        public_key: &VerifyingKey,
        signature: &SignatureBytes,
    ) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;

        let message = self
            .signing_bytes()
            .map_err(|_| SignatureError::SerializationFailed)?;
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_ref());

        public_key
            .verify(&message, &signature)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

/// What gets timestamped: the plaintext payload together with its signature.
#[derive(Debug, Clone, Serialize)]
pub struct SignedPayload<'a> {
    pub payload: &'a AttestationPayload,
    pub signature: &'a SignatureBytes,
}

impl SignedPayload<'_> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(self)
    }
}

/// The value as it sits in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredValue {
    Plain(Value),
    Encrypted(#[serde(with = "bytes")] Vec<u8>),
}

impl StoredValue {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredValue::Encrypted(_))
    }
}

/// The attestation as stored: plaintext or ciphertext, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttestation {
    #[serde(rename = "CID")]
    pub cid: ContentId,
    pub attribute: String,
    pub body: StoredValue,
}

/// The unit written under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub attestation: StoredAttestation,
    pub signature: SignatureBytes,
    pub timestamp: TimestampProof,
}

impl StoredRecord {
    pub fn is_encrypted(&self) -> bool {
        self.attestation.body.is_encrypted()
    }

    /// Serialize to canonical CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(self)
    }

    /// Deserialize from canonical CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        from_canonical_cbor(bytes)
    }
}

/// A verified, decoded attestation as returned by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub subject: ContentId,
    pub attribute: String,
    /// Plaintext value
    pub value: Value,
    /// Whether the value was encrypted at rest
    pub encrypted: bool,
    pub signature: SignatureBytes,
    pub timestamp: TimestampProof,
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Serialization failed")]
    SerializationFailed,

    #[error("Invalid signature")]
    InvalidSignature,
}
