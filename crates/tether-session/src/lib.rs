//! Two-tier session cache for a request-response protocol server.
//!
//! Sessions live in two places:
//! - a hot tier of attached, ready-to-serve session handles inside this
//!   process, behind a single reader/writer lock
//! - a durable key-value store (Redis by default) holding serialized
//!   [`SessionRecord`]s with a fixed TTL, shared by every server instance
//!
//! ```text
//! load(id) ─▶ hot tier ──hit──▶ session
//!                │ miss
//!                ▼
//!           durable get ──absent──▶ NotFound
//!                │ bytes
//!                ▼
//!        decode record ─▶ owner.reattach ─▶ insert into hot tier ─▶ session
//! ```
//!
//! The cache never constructs live sessions itself; a [`SessionOwner`] does.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_session::{SessionCache, StoreConfig};
//!
//! let config = StoreConfig::new()
//!     .with_addr("localhost:6379")
//!     .with_ttl(Duration::from_secs(3600));
//!
//! let cache = SessionCache::builder(config).owner(&server).connect().await?;
//! cache.store(&id, &session).await?;
//! let session = cache.load(&id).await?;
//! ```

mod cache;
mod config;
mod error;
mod owner;
mod record;
mod redis_store;
mod store;

pub use cache::{CacheEntry, SessionCache, SessionCacheBuilder};
pub use config::{
    DEFAULT_ADDR, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PREFIX, DEFAULT_TTL,
    StoreConfig,
};
pub use error::{BoxError, Error, KvError, Result};
pub use owner::{LiveSession, SessionOwner};
pub use record::{ClientInfo, SessionRecord};
pub use redis_store::RedisStore;
pub use store::{KvResult, KvStore, MemoryStore};
