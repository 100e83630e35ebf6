//! Store interface and an in-memory append-only implementation.
//!
//! The write path only needs binary `get`/`put`, plus batches that can be
//! locked exclusively, read their own buffered writes and commit atomically.
//!
//! ```text
//! store.batch() → batch
//! batch.lock()      exclusive across every batch of the same store
//! batch.get/put     buffered, read-your-writes
//! batch.flush()     commit all buffered puts at once, release the lock
//! drop(batch)       discard buffered puts, release the lock
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("Timed out after {0:?} waiting for the batch lock")]
    Timeout(Duration),

    #[error("Batch lock is already held by this batch")]
    AlreadyHeld,
}

/// Something attestations can be read from and written to: a store or an
/// open batch.
#[async_trait]
pub trait KvTarget: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;
}

/// A buffered, lockable unit of store operations committed together.
#[async_trait]
pub trait Batch: KvTarget + Sized {
    /// Acquire the store-wide batch lock, waiting at most `timeout`.
    async fn lock(&mut self, timeout: Option<Duration>) -> Result<(), LockError>;

    /// Whether this batch currently holds the store-wide lock.
    fn is_locked(&self) -> bool;

    /// Commit buffered writes atomically and release the lock.
    async fn flush(self) -> Result<(), StoreError>;
}

/// A store that can open batches.
pub trait Store: KvTarget {
    type Batch: Batch;

    fn batch(&self) -> Self::Batch;
}

#[async_trait]
impl<T: KvTarget + ?Sized> KvTarget for Arc<T> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, value).await
    }
}

#[derive(Debug, Default)]
struct Log {
    /// Every version ever written, per key, oldest first
    versions: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
    /// Total number of committed puts
    length: u64,
}

impl Log {
    fn append(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.versions.entry(key).or_default().push(value);
        self.length += 1;
    }

    fn latest(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.versions.get(key).and_then(|v| v.last().cloned())
    }
}

/// In-memory append-only store.
///
/// A write never replaces data: it appends a new version which later reads
/// return. Clones share the same underlying log and batch lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    log: Arc<RwLock<Log>>,
    batch_lock: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        tracing::debug!("creating new in-memory store");
        Self::default()
    }

    /// Number of committed puts.
    pub async fn len(&self) -> u64 {
        self.log.read().await.length
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every version written under `key`, oldest first.
    pub async fn history(&self, key: &[u8]) -> Vec<Vec<u8>> {
        self.log
            .read()
            .await
            .versions
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys starting with `prefix`, in order.
    pub async fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let log = self.log.read().await;
        log.versions
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl KvTarget for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.log.read().await.latest(key))
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        tracing::trace!(key_len = key.len(), value_len = value.len(), "MemoryStore::put");
        self.log.write().await.append(key.to_vec(), value);
        Ok(())
    }
}

impl Store for MemoryStore {
    type Batch = MemoryBatch;

    fn batch(&self) -> MemoryBatch {
        MemoryBatch {
            store: self.clone(),
            pending: Mutex::new(BTreeMap::new()),
            guard: None,
        }
    }
}

/// Batch over a [`MemoryStore`].
///
/// The lock guard is owned by the batch, so every way of ending the batch
/// (flush, early return, panic, a dropped future) releases the lock.
#[derive(Debug)]
pub struct MemoryBatch {
    store: MemoryStore,
    pending: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl KvTarget for MemoryBatch {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.pending.lock().await.get(key) {
            return Ok(Some(value.clone()));
        }
        self.store.get(key).await
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.pending.lock().await.insert(key.to_vec(), value);
        Ok(())
    }
}

#[async_trait]
impl Batch for MemoryBatch {
    async fn lock(&mut self, timeout: Option<Duration>) -> Result<(), LockError> {
        if self.guard.is_some() {
            return Err(LockError::AlreadyHeld);
        }
        let acquire = self.store.batch_lock.clone().lock_owned();
        let guard = match timeout {
            Some(limit) => tokio::time::timeout(limit, acquire)
                .await
                .map_err(|_| LockError::Timeout(limit))?,
            None => acquire.await,
        };
        self.guard = Some(guard);
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    async fn flush(self) -> Result<(), StoreError> {
        let pending = self.pending.into_inner();
        if !pending.is_empty() {
            let mut log = self.store.log.write().await;
            for (key, value) in pending {
                log.append(key, value);
            }
        }
        // Guard drops here, after the writes are visible
        drop(self.guard);
        Ok(())
    }
}
