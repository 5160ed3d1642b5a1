//! Two-tier session cache.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::owner::{LiveSession, SessionOwner};
use crate::record::SessionRecord;
use crate::redis_store::RedisStore;
use crate::store::KvStore;

/// Entry stored in the hot tier.
#[derive(Debug, Clone)]
pub struct CacheEntry<S> {
    /// Live session handle.
    pub session: S,

    /// When this entry was inserted.
    pub cached_at: Instant,

    /// When this entry stops being served, if hot-tier expiry is enabled.
    pub expires_at: Option<Instant>,
}

impl<S> CacheEntry<S> {
    /// Create a new entry, expiring after `ttl` if given.
    pub fn new(session: S, ttl: Option<Duration>) -> Self {
        let cached_at = Instant::now();
        Self {
            session,
            cached_at,
            expires_at: ttl.map(|ttl| cached_at + ttl),
        }
    }

    /// Whether the entry has passed its expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Loads and stores of one id that have not reached the hot tier yet.
#[derive(Debug, Default)]
struct InFlight {
    writers: usize,
    deletes: u64,
}

/// Hot-tier contents: served entries plus bookkeeping for writes in flight.
///
/// A delete bumps the `deletes` generation of any in-flight writes for its
/// id; a write that sees a bumped generation does not insert, so a delete
/// can never be undone by a load or store that started before it finished.
struct HotTier<S> {
    entries: HashMap<String, CacheEntry<S>>,
    in_flight: HashMap<String, InFlight>,
}

impl<S> HotTier<S> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    fn begin_write(&mut self, session_id: &str) -> u64 {
        let slot = self.in_flight.entry(session_id.to_string()).or_default();
        slot.writers += 1;
        slot.deletes
    }

    fn finish_write(&mut self, session_id: &str) {
        if let Some(slot) = self.in_flight.get_mut(session_id) {
            slot.writers = slot.writers.saturating_sub(1);
            if slot.writers == 0 {
                self.in_flight.remove(session_id);
            }
        }
    }

    fn deleted_since(&self, session_id: &str, deletes_seen: u64) -> bool {
        self.in_flight
            .get(session_id)
            .is_some_and(|slot| slot.deletes != deletes_seen)
    }

    fn evict(&mut self, session_id: &str) -> bool {
        if let Some(slot) = self.in_flight.get_mut(session_id) {
            slot.deletes += 1;
        }
        self.entries.remove(session_id).is_some()
    }
}

/// An in-flight write. Dropping it, on any path, ends the registration.
struct WriteTicket<'a, S> {
    live: &'a RwLock<HotTier<S>>,
    session_id: &'a str,
    deletes_seen: u64,
}

impl<'a, S> WriteTicket<'a, S> {
    fn begin(live: &'a RwLock<HotTier<S>>, session_id: &'a str) -> Self {
        let deletes_seen = live.write().begin_write(session_id);
        Self {
            live,
            session_id,
            deletes_seen,
        }
    }
}

impl<S> Drop for WriteTicket<'_, S> {
    fn drop(&mut self) {
        self.live.write().finish_write(self.session_id);
    }
}

/// Session cache with an in-process hot tier over a durable key-value store.
///
/// - Hot tier: map of live sessions behind a single reader/writer lock.
///   The lock is never held across a durable-tier call.
/// - Durable tier: any [`KvStore`], Redis by default. Source of truth and
///   the sharing mechanism between instances.
///
/// Cloning is cheap and shares both tiers.
pub struct SessionCache<O: SessionOwner, K: KvStore = RedisStore> {
    live: Arc<RwLock<HotTier<O::Session>>>,
    store: Arc<K>,
    owner: Weak<O>,
    config: Arc<StoreConfig>,
}

/// Builder for [`SessionCache`].
///
/// The owner is mandatory; every build method fails with
/// [`Error::Configuration`] when it was not supplied.
pub struct SessionCacheBuilder<O: SessionOwner> {
    config: StoreConfig,
    owner: Option<Weak<O>>,
}

impl<O: SessionOwner> SessionCacheBuilder<O> {
    /// Set the session owner. The cache keeps only a weak reference;
    /// the owner must outlive it.
    pub fn owner(mut self, owner: &Arc<O>) -> Self {
        self.owner = Some(Arc::downgrade(owner));
        self
    }

    /// Connect to Redis and build the cache.
    pub async fn connect(self) -> Result<SessionCache<O, RedisStore>> {
        let owner = self.require_owner()?;
        let config = self.config.with_defaults();
        let store = RedisStore::connect(&config).await?;
        Ok(SessionCache::assemble(config, store, owner))
    }

    /// Build the cache over an already-constructed store, probing it first.
    pub async fn with_store<K: KvStore>(self, store: K) -> Result<SessionCache<O, K>> {
        let owner = self.require_owner()?;
        let config = self.config.with_defaults();

        match tokio::time::timeout(config.connect_timeout, store.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(Error::Connection(format!("session store unreachable: {e}")));
            }
            Err(_) => {
                return Err(Error::Connection(format!(
                    "session store did not answer within {:?}",
                    config.connect_timeout
                )));
            }
        }

        Ok(SessionCache::assemble(config, store, owner))
    }

    /// Build the cache over a store whose connection was already verified,
    /// such as one returned by [`RedisStore::connect`]. Does not probe.
    pub fn with_connected_store<K: KvStore>(self, store: K) -> Result<SessionCache<O, K>> {
        let owner = self.require_owner()?;
        Ok(SessionCache::assemble(self.config.with_defaults(), store, owner))
    }

    fn require_owner(&self) -> Result<Weak<O>> {
        self.owner
            .clone()
            .ok_or_else(|| Error::Configuration("session owner reference is required".to_string()))
    }
}

impl<O: SessionOwner> SessionCache<O, RedisStore> {
    /// Start building a cache from a store configuration.
    pub fn builder(config: StoreConfig) -> SessionCacheBuilder<O> {
        SessionCacheBuilder {
            config,
            owner: None,
        }
    }
}

impl<O: SessionOwner, K: KvStore> SessionCache<O, K> {
    fn assemble(config: StoreConfig, store: K, owner: Weak<O>) -> Self {
        debug!(
            prefix = %config.prefix,
            ttl_secs = config.ttl.as_secs(),
            expire_hot_tier = config.expire_hot_tier,
            "Session cache ready"
        );
        Self {
            live: Arc::new(RwLock::new(HotTier::new())),
            store: Arc::new(store),
            owner,
            config: Arc::new(config),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get a live session, reattaching it from the durable tier on a miss.
    ///
    /// Returns [`Error::NotFound`] when neither tier holds the session.
    /// Durable-tier failures are returned as [`Error::Storage`] without retry.
    pub async fn load(&self, session_id: &str) -> Result<O::Session> {
        if let Some(session) = self.cached(session_id) {
            trace!(session_id = %session_id, "Session found in cache");
            return Ok(session);
        }

        debug!(session_id = %session_id, "Session cache miss, loading from store");

        let ticket = WriteTicket::begin(&*self.live, session_id);
        let key = self.config.key_for(session_id);
        let bytes = self
            .store
            .get(&key)
            .await
            .map_err(|e| Error::storage("load", session_id, e))?
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;

        let mut record =
            SessionRecord::from_bytes(&bytes).map_err(|source| Error::Deserialization {
                session_id: session_id.to_string(),
                source,
            })?;
        if record.id != session_id {
            warn!(
                session_id = %session_id,
                stored_id = %record.id,
                "Stored record id does not match its key, using the key"
            );
            record.id = session_id.to_string();
        }

        let owner = self.owner.upgrade().ok_or_else(|| Error::Reattach {
            session_id: session_id.to_string(),
            source: "session owner has been dropped".into(),
        })?;
        let session = owner.reattach(record).map_err(|source| Error::Reattach {
            session_id: session_id.to_string(),
            source,
        })?;

        // A concurrent load may have inserted first; last write wins.
        match self.install(&ticket, &session) {
            Some(cache_size) => debug!(
                session_id = %session_id,
                cache_size = cache_size,
                "Session reattached from store"
            ),
            None => debug!(
                session_id = %session_id,
                "Session deleted while loading, not cached"
            ),
        }

        Ok(session)
    }

    /// Persist a session and make it the hot-tier entry for `session_id`.
    ///
    /// The durable write refreshes the record's TTL. If it fails the hot
    /// tier is left untouched. If a delete of the same id completes while
    /// the write is in flight, the delete wins and nothing is cached.
    pub async fn store(&self, session_id: &str, session: &O::Session) -> Result<()> {
        let mut record = session.record();
        record.id = session_id.to_string();
        record.updated_at = Some(chrono::Utc::now());

        let bytes = record.to_bytes().map_err(|source| Error::Serialization {
            session_id: session_id.to_string(),
            source,
        })?;

        let ticket = WriteTicket::begin(&*self.live, session_id);
        let key = self.config.key_for(session_id);
        self.store
            .set(&key, bytes, self.config.ttl)
            .await
            .map_err(|e| Error::storage("store", session_id, e))?;

        match self.install(&ticket, session) {
            Some(cache_size) => trace!(
                session_id = %session_id,
                key = %key,
                cache_size = cache_size,
                "Session stored"
            ),
            None => debug!(
                session_id = %session_id,
                key = %key,
                "Session deleted while storing, not cached"
            ),
        }

        Ok(())
    }

    /// Remove a session from both tiers.
    ///
    /// Deleting an unknown session succeeds. The hot-tier entry is evicted
    /// even when the durable delete fails; the failure is still returned.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let key = self.config.key_for(session_id);
        let result = self.store.delete(&key).await;

        let owner = self.owner.upgrade();
        let evicted = {
            let mut live = self.live.write();
            let evicted = live.evict(session_id);
            if let (true, Some(owner)) = (evicted, &owner) {
                owner.released(session_id);
            }
            evicted
        };

        match result {
            Ok(()) => {
                debug!(session_id = %session_id, evicted = evicted, "Session deleted");
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    evicted = evicted,
                    error = %e,
                    "Durable delete failed, hot-tier copy evicted anyway"
                );
                Err(Error::storage("delete", session_id, e))
            }
        }
    }

    /// Probe the durable tier. Has no effect on cache state.
    pub async fn health(&self) -> Result<()> {
        self.store
            .ping()
            .await
            .map_err(|e| Error::Connection(format!("session store unreachable: {e}")))
    }

    /// Release the durable-tier connection and drop all live sessions.
    ///
    /// Call once, after every other operation has finished. Operations
    /// issued afterwards fail with storage errors.
    pub async fn close(&self) -> Result<()> {
        let owner = self.owner.upgrade();
        let dropped = {
            let mut live = self.live.write();
            let n = live.entries.len();
            for (session_id, _) in live.entries.drain() {
                if let Some(owner) = &owner {
                    owner.released(&session_id);
                }
            }
            n
        };
        self.store
            .close()
            .await
            .map_err(|e| Error::Connection(format!("failed to close session store: {e}")))?;
        info!(live_sessions = dropped, "Session cache closed");
        Ok(())
    }

    /// Number of sessions currently held in the hot tier.
    pub fn cached_len(&self) -> usize {
        self.live.read().entries.len()
    }

    /// Whether the hot tier holds a servable entry for `session_id`.
    pub fn is_cached(&self, session_id: &str) -> bool {
        let now = Instant::now();
        self.live
            .read()
            .entries
            .get(session_id)
            .is_some_and(|e| !e.is_expired(now))
    }

    fn entry(&self, session: O::Session) -> CacheEntry<O::Session> {
        let ttl = self.config.expire_hot_tier.then_some(self.config.ttl);
        CacheEntry::new(session, ttl)
    }

    /// Insert `session` unless a delete landed since `ticket` was taken.
    /// Returns the new hot-tier size, or `None` when the delete won.
    fn install(&self, ticket: &WriteTicket<'_, O::Session>, session: &O::Session) -> Option<usize> {
        let owner = self.owner.upgrade();
        let mut live = self.live.write();
        if live.deleted_since(ticket.session_id, ticket.deletes_seen) {
            return None;
        }
        live.entries
            .insert(ticket.session_id.to_string(), self.entry(session.clone()));
        if let Some(owner) = &owner {
            owner.attached(session);
        }
        Some(live.entries.len())
    }

    /// Hot-tier lookup. Expired entries are evicted and reported as a miss.
    fn cached(&self, session_id: &str) -> Option<O::Session> {
        let now = Instant::now();
        {
            let live = self.live.read();
            match live.entries.get(session_id) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.session.clone()),
                Some(_) => {}
            }
        }

        let owner = self.owner.upgrade();
        let mut live = self.live.write();
        // Re-check: a store may have replaced the entry since the read.
        if live.entries.get(session_id).is_some_and(|e| e.is_expired(now)) {
            live.entries.remove(session_id);
            if let Some(owner) = &owner {
                owner.released(session_id);
            }
            debug!(session_id = %session_id, "Hot-tier entry expired, evicted");
        }
        None
    }
}

impl<O: SessionOwner, K: KvStore> Clone for SessionCache<O, K> {
    fn clone(&self) -> Self {
        Self {
            live: Arc::clone(&self.live),
            store: Arc::clone(&self.store),
            owner: Weak::clone(&self.owner),
            config: Arc::clone(&self.config),
        }
    }
}
