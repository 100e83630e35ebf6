//! Timestamp authority interface.
//!
//! An authority receives the canonical bytes of a signed attestation and
//! returns a proof that those bytes existed no later than `issued_at`. The
//! proof records the SHA-256 digest it covers so readers can bind it back to
//! the record without contacting the authority.

use crate::crypto::{sha256, Signer, VerifyingKey};
use crate::types::{bytes, Hash256, SignatureBytes};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proof that a payload existed at or before `issued_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampProof {
    /// Name of the issuing authority
    pub authority: String,
    /// SHA-256 of the timestamped payload
    #[serde(with = "bytes::array32")]
    pub digest: Hash256,
    /// Time asserted by the authority
    pub issued_at: DateTime<Utc>,
    /// Authority-specific token (opaque to this crate)
    #[serde(with = "bytes")]
    pub token: Vec<u8>,
}

impl TimestampProof {
    /// Whether this proof was issued over `payload`.
    pub fn covers(&self, payload: &[u8]) -> bool {
        self.digest == sha256(payload)
    }
}

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("Timestamp authority unreachable: {0}")]
    Unavailable(String),

    #[error("Timestamp authority rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid timestamp response: {0}")]
    InvalidResponse(String),
}

/// A service that timestamps signed payloads.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    /// Name recorded in issued proofs.
    fn name(&self) -> &str;

    /// Obtain a proof over `payload`.
    async fn timestamp(&self, payload: &[u8]) -> Result<TimestampProof, TimestampError>;
}

/// An in-process authority that signs `digest || issued_at` with its own key.
///
/// Suitable when the clock of the writing process is trusted, and for tests.
#[derive(Debug, Clone)]
pub struct LocalTimestamper {
    name: String,
    signer: Signer,
}

impl LocalTimestamper {
    pub fn new(name: impl Into<String>, signer: Signer) -> Self {
        Self {
            name: name.into(),
            signer,
        }
    }

    /// Create an authority with a freshly generated key.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(name, Signer::generate())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    fn token_message(digest: &Hash256, issued_at: i64) -> Vec<u8> {
        let mut message = Vec::with_capacity(32 + 8);
        message.extend_from_slice(digest);
        message.extend_from_slice(&issued_at.to_be_bytes());
        message
    }

    /// Check a proof issued by an authority holding `key`.
    pub fn verify(proof: &TimestampProof, key: &VerifyingKey) -> bool {
        use ed25519_dalek::Verifier;

        let Ok(token) = <[u8; 64]>::try_from(proof.token.as_slice()) else {
            return false;
        };
        let message = Self::token_message(&proof.digest, proof.issued_at.timestamp());
        let signature = ed25519_dalek::Signature::from_bytes(&token);
        key.verify(&message, &signature).is_ok()
    }
}

#[async_trait]
impl TimestampAuthority for LocalTimestamper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn timestamp(&self, payload: &[u8]) -> Result<TimestampProof, TimestampError> {
        let digest = sha256(payload);
        // Whole seconds, so the token message can be rebuilt from the proof
        let secs = Utc::now().timestamp();
        let issued_at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| TimestampError::Unavailable("clock out of range".to_string()))?;
        let token = SignatureBytes::from(self.signer.sign(&Self::token_message(&digest, secs)));

        tracing::debug!(authority = %self.name, %issued_at, "issued local timestamp");

        Ok(TimestampProof {
            authority: self.name.clone(),
            digest,
            issued_at,
            token: token.0.to_vec(),
        })
    }
}
