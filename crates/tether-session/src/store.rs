//! Durable-tier adapter contract.
//!
//! The cache talks to its durable tier only through [`KvStore`]. Keys arrive
//! already namespaced; values are opaque bytes. [`MemoryStore`] is an
//! in-process implementation for single-instance deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::KvError;

/// Result type for adapter operations.
pub type KvResult<T> = std::result::Result<T, KvError>;

/// A key-value store with per-key expiration.
///
/// Implementations must be safe for concurrent use; the cache shares one
/// adapter across every in-flight operation.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Fetch a value. `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Write a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> KvResult<()>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> KvResult<()>;

    /// Whether a live (unexpired) key exists.
    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Liveness probe.
    async fn ping(&self) -> KvResult<()>;

    /// Release the underlying connection.
    async fn close(&self) -> KvResult<()>;
}

#[async_trait]
impl<K: KvStore + ?Sized> KvStore for Arc<K> {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> KvResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        (**self).exists(key).await
    }

    async fn ping(&self) -> KvResult<()> {
        (**self).ping().await
    }

    async fn close(&self) -> KvResult<()> {
        (**self).close().await
    }
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process [`KvStore`] backed by a hash map.
///
/// Expired keys are treated as absent and dropped lazily on access. Time is
/// read from `tokio::time`, so a paused test clock drives expiry.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|v| v.expires_at > now)
            .count()
    }

    /// Whether the store holds no unexpired keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> KvResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(KvError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.check_open()?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(v) if v.expires_at > Instant::now() => Ok(Some(v.bytes.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> KvResult<()> {
        self.check_open()?;
        let stored = StoredValue {
            bytes: value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.check_open()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn ping(&self) -> KvResult<()> {
        self.check_open()
    }

    async fn close(&self) -> KvResult<()> {
        self.closed.store(true, Ordering::Release);
        self.entries.lock().clear();
        Ok(())
    }
}
