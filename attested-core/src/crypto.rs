//! Cryptographic primitives for attestation.

use crate::types::Hash256;
pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Compute SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> Hash256 {
    let hash = Sha256::digest(data);
    hash.into()
}

#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error("Cannot read signing key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PKCS#8 Ed25519 key: {0}")]
    Pkcs8(String),
}

/// A signer that can create Ed25519 signatures.
///
/// Ed25519 is deterministic: signing the same message twice with the same key
/// yields the same signature.
#[derive(Clone)]
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Create a new signer from a signing key.
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Generate a new random signing key.
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self { signing_key }
    }

    /// Load a PKCS#8 PEM encoded Ed25519 private key.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, KeyLoadError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    /// Parse a PKCS#8 PEM encoded Ed25519 private key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyLoadError> {
        use ed25519_dalek::pkcs8::DecodePrivateKey;
        let signing_key =
            SigningKey::from_pkcs8_pem(pem).map_err(|e| KeyLoadError::Pkcs8(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer as _;
        self.signing_key.sign(message)
    }

    /// Get the verifying (public) key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}
