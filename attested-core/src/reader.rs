//! Read path: decode, decrypt and verify a stored attestation.

use crate::crypter::{decrypt_value, EncryptionKey};
use crate::crypto::VerifyingKey;
use crate::error::{AttestError, Result};
use crate::key::encode_key;
use crate::record::{Attestation, AttestationPayload, SignedPayload, StoredRecord, StoredValue};
use crate::store::KvTarget;
use crate::types::{ContentId, FormatError};

/// Load the raw record at (subject, attribute) without verifying it.
pub async fn read_record<T: KvTarget + ?Sized>(
    target: &T,
    subject: &ContentId,
    attribute: &str,
) -> Result<Option<StoredRecord>> {
    let key = encode_key(subject, attribute);
    let Some(bytes) = target.get(&key).await? else {
        return Ok(None);
    };
    let record = StoredRecord::from_bytes(&bytes)?;

    let stored = &record.attestation;
    if &stored.cid != subject || stored.attribute != attribute {
        return Err(FormatError::KeyMismatch {
            key: String::from_utf8_lossy(&key).into_owned(),
            found: format!("{}/{}", stored.cid, stored.attribute),
        }
        .into());
    }

    Ok(Some(record))
}

/// Read and verify the attestation at (subject, attribute).
///
/// Returns `None` if nothing is stored. Encrypted records need
/// `encryption_key`. The signature must verify against `signer`, and the
/// timestamp proof must cover the signed record.
pub async fn read_attestation<T: KvTarget + ?Sized>(
    target: &T,
    subject: &ContentId,
    attribute: &str,
    signer: &VerifyingKey,
    encryption_key: Option<&EncryptionKey>,
) -> Result<Option<Attestation>> {
    let Some(record) = read_record(target, subject, attribute).await? else {
        return Ok(None);
    };

    let StoredRecord {
        attestation,
        signature,
        timestamp,
    } = record;

    let (value, encrypted) = match attestation.body {
        StoredValue::Plain(value) => (value, false),
        StoredValue::Encrypted(ciphertext) => {
            let key = encryption_key.ok_or_else(|| AttestError::MissingEncryptionKey {
                attribute: attribute.to_string(),
            })?;
            (decrypt_value(&ciphertext, key)?, true)
        }
    };

    let payload = AttestationPayload::new(attestation.cid, attestation.attribute, value, encrypted);
    payload
        .verify(signer, &signature)
        .map_err(|_| AttestError::InvalidSignature {
            attribute: attribute.to_string(),
        })?;

    let signed = SignedPayload {
        payload: &payload,
        signature: &signature,
    }
    .to_bytes()?;
    if !timestamp.covers(&signed) {
        return Err(AttestError::TimestampMismatch {
            attribute: attribute.to_string(),
        });
    }

    tracing::trace!(%subject, attribute, encrypted, "verified attestation");

    Ok(Some(Attestation {
        subject: payload.cid,
        attribute: payload.attribute,
        value: payload.value,
        encrypted,
        signature,
        timestamp,
    }))
}
