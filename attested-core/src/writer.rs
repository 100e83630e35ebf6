//! The attestation write path.
//!
//! [`Attestor`] carries the signing identity and the timestamp authority
//! explicitly; there is no process-global key. Clone it freely: clones share
//! the signer and the authority.
//!
//! ## Write (`put`)
//! 1. Build the plaintext payload `{cid, attribute, value, encrypted}`
//! 2. Sign it
//! 3. Encrypt the value if a key was given (the signature is kept as is)
//! 4. Timestamp `{payload, signature}`
//! 5. Write `{attestation, signature, timestamp}` with a single put
//!
//! ## Append (`append`)
//! Read, extend and rewrite a list attribute while holding the store's batch
//! lock, so concurrent appenders cannot overwrite each other's elements.

use crate::config::{AttestorConfig, ConfigError};
use crate::crypter::{encrypt_value, EncryptionKey};
use crate::crypto::{Signer, VerifyingKey};
use crate::error::{AttestError, Result};
use crate::key::encode_key;
use crate::reader::read_attestation;
use crate::record::{
    Attestation, AttestationPayload, SignedPayload, StoredAttestation, StoredRecord, StoredValue,
};
use crate::store::{Batch, KvTarget, Store};
use crate::timestamp::{LocalTimestamper, TimestampAuthority};
use crate::types::{ContentId, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Attestor {
    signer: Option<Arc<Signer>>,
    authority: Arc<dyn TimestampAuthority>,
    lock_timeout: Option<Duration>,
}

impl Attestor {
    /// Create an attestor without a signing key. Writes fail until one is set.
    pub fn new(authority: Arc<dyn TimestampAuthority>) -> Self {
        Self {
            signer: None,
            authority,
            lock_timeout: None,
        }
    }

    /// Build an attestor from configuration.
    ///
    /// Timestamps are issued locally under the signing key, so the signer's
    /// verifying key also checks the proofs.
    pub fn from_config(config: &AttestorConfig) -> std::result::Result<Self, ConfigError> {
        let signer = config.load_signer()?;
        let authority = LocalTimestamper::new(config.authority_name.clone(), signer.clone());
        let attestor = Self::new(Arc::new(authority))
            .with_signer(signer)
            .with_lock_timeout(config.lock_timeout());
        Ok(attestor)
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.set_signing_key(signer);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace the signing identity.
    ///
    /// Meant to be called once at startup. Writes already running on clones
    /// of this attestor keep the key they started with.
    pub fn set_signing_key(&mut self, signer: Signer) {
        tracing::info!(verifying_key = ?signer.verifying_key(), "signing key configured");
        self.signer = Some(Arc::new(signer));
    }

    fn signer(&self) -> Result<&Signer> {
        self.signer.as_deref().ok_or(AttestError::MissingSigningKey)
    }

    /// Public half of the signing identity.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        Ok(self.signer()?.verifying_key())
    }

    pub fn authority(&self) -> &dyn TimestampAuthority {
        self.authority.as_ref()
    }

    /// Sign, optionally encrypt, timestamp and write one attestation.
    ///
    /// `target` may be a store or an open batch; with a batch the write
    /// becomes visible when the batch is flushed. Errors are returned as they
    /// arrive; nothing is retried.
    pub async fn put<T: KvTarget + ?Sized>(
        &self,
        target: &T,
        subject: &ContentId,
        attribute: &str,
        value: Value,
        encryption_key: Option<&EncryptionKey>,
    ) -> Result<StoredRecord> {
        let signer = self.signer()?;
        let encrypted = encryption_key.is_some();

        let payload = AttestationPayload::new(subject.clone(), attribute, value, encrypted);
        let signature = payload.sign(signer)?;

        let body = match encryption_key {
            Some(key) => StoredValue::Encrypted(encrypt_value(&payload.value, key)?),
            None => StoredValue::Plain(payload.value.clone()),
        };

        let signed = SignedPayload {
            payload: &payload,
            signature: &signature,
        }
        .to_bytes()?;
        let timestamp = self.authority.timestamp(&signed).await?;

        let record = StoredRecord {
            attestation: StoredAttestation {
                cid: payload.cid,
                attribute: payload.attribute,
                body,
            },
            signature,
            timestamp,
        };

        target
            .put(&encode_key(subject, attribute), record.to_bytes()?)
            .await?;

        tracing::debug!(%subject, attribute, encrypted, "attestation written");
        Ok(record)
    }

    /// Read and verify an attestation written by this attestor's signer.
    pub async fn get<T: KvTarget + ?Sized>(
        &self,
        target: &T,
        subject: &ContentId,
        attribute: &str,
        encryption_key: Option<&EncryptionKey>,
    ) -> Result<Option<Attestation>> {
        let verifying_key = self.verifying_key()?;
        read_attestation(target, subject, attribute, &verifying_key, encryption_key).await
    }

    /// Append `value` to the list stored at (subject, attribute).
    ///
    /// Creates `[value]` if nothing is stored yet and fails with
    /// [`AttestError::TypeMismatch`] if a non-list value is stored. Returns
    /// the new list.
    ///
    /// The read, the decision and the write all happen inside one locked
    /// batch. If anything fails before the commit the batch is dropped: its
    /// buffered write is discarded and the lock released.
    pub async fn append<S: Store + ?Sized>(
        &self,
        store: &S,
        subject: &ContentId,
        attribute: &str,
        value: Value,
        encryption_key: Option<&EncryptionKey>,
    ) -> Result<Vec<Value>> {
        let verifying_key = self.verifying_key()?;

        let mut batch = store.batch();
        batch.lock(self.lock_timeout).await?;
        tracing::debug!(%subject, attribute, "batch locked for append");

        let current =
            read_attestation(&batch, subject, attribute, &verifying_key, encryption_key).await?;

        let list = match current.map(|attestation| attestation.value) {
            None => vec![value],
            Some(Value::List(mut items)) => {
                items.push(value);
                items
            }
            Some(other) => {
                return Err(AttestError::TypeMismatch {
                    attribute: attribute.to_string(),
                    found: other.kind(),
                });
            }
        };

        self.put(
            &batch,
            subject,
            attribute,
            Value::List(list.clone()),
            encryption_key,
        )
        .await?;

        batch.flush().await?;

        tracing::debug!(%subject, attribute, len = list.len(), "append committed");
        Ok(list)
    }
}

impl fmt::Debug for Attestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attestor")
            .field("signer", &self.signer)
            .field("authority", &self.authority.name())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::timestamp::{TimestampError, TimestampProof};
    use async_trait::async_trait;

    fn attestor() -> Attestor {
        Attestor::new(Arc::new(LocalTimestamper::generate("test-tsa")))
            .with_signer(Signer::generate())
    }

    fn cid(name: &str) -> ContentId {
        ContentId::for_raw_block(name.as_bytes())
    }

    struct FailingAuthority;

    #[async_trait]
    impl TimestampAuthority for FailingAuthority {
        fn name(&self) -> &str {
            "failing"
        }

        async fn timestamp(&self, _payload: &[u8]) -> std::result::Result<TimestampProof, TimestampError> {
            Err(TimestampError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("site.wacz");

        attestor
            .put(&store, &asset, "filename", Value::from("site.wacz"), None)
            .await
            .unwrap();

        let read = attestor
            .get(&store, &asset, "filename", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, Value::from("site.wacz"));
        assert!(!read.encrypted);
        assert_eq!(read.timestamp.authority, "test-tsa");
    }

    #[tokio::test]
    async fn test_get_absent() {
        let store = MemoryStore::new();
        let result = attestor()
            .get(&store, &cid("nothing"), "filename", None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_encrypted_put() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");
        let key = EncryptionKey::generate();

        let record = attestor
            .put(&store, &asset, "email", Value::from("a@example.org"), Some(&key))
            .await
            .unwrap();
        assert!(record.is_encrypted());

        let raw = store.get(&encode_key(&asset, "email")).await.unwrap().unwrap();
        assert!(!raw.windows(13).any(|w| w == b"a@example.org"));

        let read = attestor
            .get(&store, &asset, "email", Some(&key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, Value::from("a@example.org"));
        assert!(read.encrypted);
    }

    #[tokio::test]
    async fn test_encrypted_read_needs_right_key() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");
        let key = EncryptionKey::generate();
        attestor
            .put(&store, &asset, "email", Value::from("x"), Some(&key))
            .await
            .unwrap();

        let missing = attestor.get(&store, &asset, "email", None).await.unwrap_err();
        assert!(matches!(missing, AttestError::MissingEncryptionKey { .. }));

        let wrong = attestor
            .get(&store, &asset, "email", Some(&EncryptionKey::generate()))
            .await
            .unwrap_err();
        assert_eq!(wrong.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_put_without_signing_key() {
        let store = MemoryStore::new();
        let attestor = Attestor::new(Arc::new(LocalTimestamper::generate("tsa")));

        let err = attestor
            .put(&store, &cid("a"), "filename", Value::from("x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttestError::MissingSigningKey));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_timestamp_failure_writes_nothing() {
        let store = MemoryStore::new();
        let attestor = Attestor::new(Arc::new(FailingAuthority)).with_signer(Signer::generate());

        let err = attestor
            .put(&store, &cid("a"), "filename", Value::from("x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttestError::Timestamp(_)));
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_foreign_signer_rejected() {
        let store = MemoryStore::new();
        let writer = attestor();
        let reader = attestor();
        let asset = cid("asset");

        writer
            .put(&store, &asset, "filename", Value::from("x"), None)
            .await
            .unwrap();

        let err = reader.get(&store, &asset, "filename", None).await.unwrap_err();
        assert!(matches!(err, AttestError::InvalidSignature { .. }));
    }

    #[tokio::test]
    async fn test_tampered_value_rejected() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");
        let mut record = attestor
            .put(&store, &asset, "filename", Value::from("real"), None)
            .await
            .unwrap();

        record.attestation.body = StoredValue::Plain(Value::from("forged"));
        store
            .put(&encode_key(&asset, "filename"), record.to_bytes().unwrap())
            .await
            .unwrap();

        let err = attestor.get(&store, &asset, "filename", None).await.unwrap_err();
        assert!(matches!(err, AttestError::InvalidSignature { .. }));
    }

    #[tokio::test]
    async fn test_record_under_wrong_key_rejected() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");
        let record = attestor
            .put(&store, &asset, "filename", Value::from("x"), None)
            .await
            .unwrap();

        store
            .put(&encode_key(&asset, "zipname"), record.to_bytes().unwrap())
            .await
            .unwrap();

        let err = attestor.get(&store, &asset, "zipname", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn test_later_write_supersedes() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");

        for name in ["first.wacz", "second.wacz"] {
            attestor
                .put(&store, &asset, "filename", Value::from(name), None)
                .await
                .unwrap();
        }

        let read = attestor.get(&store, &asset, "filename", None).await.unwrap().unwrap();
        assert_eq!(read.value, Value::from("second.wacz"));
        assert_eq!(store.history(&encode_key(&asset, "filename")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_put_into_batch_waits_for_flush() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");

        let batch = store.batch();
        attestor
            .put(&batch, &asset, "filename", Value::from("x"), None)
            .await
            .unwrap();
        assert!(attestor.get(&batch, &asset, "filename", None).await.unwrap().is_some());
        assert!(attestor.get(&store, &asset, "filename", None).await.unwrap().is_none());

        batch.flush().await.unwrap();
        assert!(attestor.get(&store, &asset, "filename", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_creates_list() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let parent = Value::Cid(cid("parent"));

        let list = attestor
            .append(&store, &cid("child"), "childOf", parent.clone(), None)
            .await
            .unwrap();
        assert_eq!(list, vec![parent.clone()]);

        let read = attestor
            .get(&store, &cid("child"), "childOf", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, Value::List(vec![parent]));
    }

    #[tokio::test]
    async fn test_append_extends_in_order() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let child = cid("child");
        let (a, b) = (Value::Cid(cid("parent-a")), Value::Cid(cid("parent-b")));

        attestor.append(&store, &child, "childOf", a.clone(), None).await.unwrap();
        let list = attestor.append(&store, &child, "childOf", b.clone(), None).await.unwrap();
        assert_eq!(list, vec![a, b]);
    }

    #[tokio::test]
    async fn test_append_onto_scalar_fails() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");
        attestor
            .put(&store, &asset, "filename", Value::from("site.wacz"), None)
            .await
            .unwrap();

        let err = attestor
            .append(&store, &asset, "filename", Value::from("more"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttestError::TypeMismatch { found: crate::types::ValueKind::Scalar, .. }
        ));

        let read = attestor.get(&store, &asset, "filename", None).await.unwrap().unwrap();
        assert_eq!(read.value, Value::from("site.wacz"));
        assert_eq!(store.len().await, 1);

        // The failed append released the lock
        attestor
            .append(&store, &asset, "childOf", Value::Null, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_encrypted_append() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");
        let key = EncryptionKey::generate();

        attestor.append(&store, &asset, "notes", Value::from("one"), Some(&key)).await.unwrap();
        let list = attestor
            .append(&store, &asset, "notes", Value::from("two"), Some(&key))
            .await
            .unwrap();
        assert_eq!(list, vec![Value::from("one"), Value::from("two")]);

        let err = attestor
            .append(&store, &asset, "notes", Value::from("three"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttestError::MissingEncryptionKey { .. }));
    }

    #[tokio::test]
    async fn test_append_lock_timeout_leaves_record() {
        let store = MemoryStore::new();
        let attestor = attestor().with_lock_timeout(Some(Duration::from_millis(20)));
        let asset = cid("asset");
        attestor.append(&store, &asset, "childOf", Value::Integer(1), None).await.unwrap();

        let mut holder = store.batch();
        holder.lock(None).await.unwrap();

        let err = attestor
            .append(&store, &asset, "childOf", Value::Integer(2), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lock);
        drop(holder);

        let read = attestor.get(&store, &asset, "childOf", None).await.unwrap().unwrap();
        assert_eq!(read.value, Value::List(vec![Value::Integer(1)]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_lose_nothing() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let child = cid("child");

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let (store, attestor, child) = (store.clone(), attestor.clone(), child.clone());
                tokio::spawn(async move {
                    attestor
                        .append(&store, &child, "childOf", Value::Integer(i), None)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let read = attestor.get(&store, &child, "childOf", None).await.unwrap().unwrap();
        let mut values: Vec<i64> = read
            .value
            .as_list()
            .unwrap()
            .iter()
            .map(|v| match v {
                Value::Integer(n) => *n,
                other => panic!("unexpected element {other:?}"),
            })
            .collect();
        values.sort_unstable();
        assert_eq!(values, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancelled_append_releases_lock() {
        let store = MemoryStore::new();
        let attestor = attestor();
        let asset = cid("asset");

        let mut holder = store.batch();
        holder.lock(None).await.unwrap();

        // The append parks on the lock and is then dropped
        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            attestor.append(&store, &asset, "childOf", Value::Integer(1), None),
        )
        .await;
        assert!(pending.is_err());
        drop(holder);

        let list = attestor
            .append(&store, &asset, "childOf", Value::Integer(2), None)
            .await
            .unwrap();
        assert_eq!(list, vec![Value::Integer(2)]);
    }

    #[tokio::test]
    async fn test_committed_append_releases_lock() {
        let store = MemoryStore::new();
        let attestor = attestor();

        attestor
            .append(&store, &cid("asset"), "childOf", Value::Integer(1), None)
            .await
            .unwrap();

        let mut next = store.batch();
        next.lock(Some(Duration::from_millis(20))).await.unwrap();
        assert!(next.is_locked());
    }
}
