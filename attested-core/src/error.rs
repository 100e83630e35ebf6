//! Errors surfaced by the write and read paths.

use crate::crypter::CrypterError;
use crate::serialization::SerializationError;
use crate::store::{LockError, StoreError};
use crate::timestamp::TimestampError;
use crate::types::{FormatError, ValueKind};
use thiserror::Error;

/// Broad classes of failure. Only `Dependency` and `Lock` can succeed on
/// retry; the rest are caller or data problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Format,
    TypeMismatch,
    Authentication,
    Dependency,
    Lock,
}

#[derive(Debug, Error)]
pub enum AttestError {
    #[error("No signing key configured")]
    MissingSigningKey,

    #[error("Record at `{attribute}` is encrypted but no encryption key was supplied")]
    MissingEncryptionKey { attribute: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("A non-list value ({found}) is stored at `{attribute}`")]
    TypeMismatch { attribute: String, found: ValueKind },

    #[error("Signature on `{attribute}` does not verify against the expected signer")]
    InvalidSignature { attribute: String },

    #[error("Timestamp proof on `{attribute}` does not cover the signed record")]
    TimestampMismatch { attribute: String },

    #[error("Crypter error: {0}")]
    Crypter(#[from] CrypterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Timestamp authority error: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

impl AttestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestError::MissingSigningKey | AttestError::MissingEncryptionKey { .. } => {
                ErrorKind::Configuration
            }
            AttestError::Format(_) => ErrorKind::Format,
            AttestError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            AttestError::InvalidSignature { .. }
            | AttestError::TimestampMismatch { .. }
            | AttestError::Crypter(CrypterError::Authentication | CrypterError::Truncated) => {
                ErrorKind::Authentication
            }
            AttestError::Crypter(_)
            | AttestError::Store(_)
            | AttestError::Timestamp(_)
            | AttestError::Serialization(_) => ErrorKind::Dependency,
            AttestError::Lock(_) => ErrorKind::Lock,
        }
    }
}

pub type Result<T> = std::result::Result<T, AttestError>;
