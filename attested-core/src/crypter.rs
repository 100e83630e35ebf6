//! Value encryption at rest.
//!
//! Values are CBOR-encoded and sealed with ChaCha20-Poly1305 under a 32-byte
//! per-subject key. The sealed form is `nonce (12 bytes) || ciphertext+tag`.
//! Where keys are kept is up to the caller; the importer stores them as
//! `enckey` attestations in a separate key store.

use crate::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use crate::types::Value;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CrypterError {
    #[error("Decryption failed: wrong key or tampered ciphertext")]
    Authentication,

    #[error("Encryption failed")]
    Encryption,

    #[error("Ciphertext too short (need at least nonce + tag)")]
    Truncated,

    #[error("Invalid encryption key: {0}")]
    InvalidKey(&'static str),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// A symmetric key for one subject's encrypted attributes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The form in which the key is itself attested.
    pub fn to_value(&self) -> Value {
        Value::Bytes(self.0.to_vec())
    }
}

impl TryFrom<&Value> for EncryptionKey {
    type Error = CrypterError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let bytes = value
            .as_bytes()
            .ok_or(CrypterError::InvalidKey("not a byte string"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CrypterError::InvalidKey("expected 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encrypt a value under `key`.
pub fn encrypt_value(value: &Value, key: &EncryptionKey) -> Result<Vec<u8>, CrypterError> {
    let plaintext = to_canonical_cbor(value)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| CrypterError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a value sealed by [`encrypt_value`].
pub fn decrypt_value(sealed: &[u8], key: &EncryptionKey) -> Result<Value, CrypterError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CrypterError::Truncated);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CrypterError::Authentication)?;

    Ok(from_canonical_cbor(&plaintext)?)
}
