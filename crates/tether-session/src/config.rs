//! Configuration for the session cache.

use std::time::Duration;

/// Default durable-store address (local Redis on its standard port).
pub const DEFAULT_ADDR: &str = "localhost:6379";

/// Default namespace prepended to every session key.
pub const DEFAULT_PREFIX: &str = "mcp:session:";

/// Default session TTL (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default bound on the liveness probe made at construction.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single durable-store command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the session cache and its durable store.
///
/// Empty or zero values are replaced by defaults in [`StoreConfig::with_defaults`],
/// so a config built from unset environment variables still connects somewhere
/// sensible.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store address, `host:port` or a `redis://` URL.
    pub addr: String,

    /// Store password.
    pub password: Option<String>,

    /// Logical database index.
    pub db: i64,

    /// Key namespace prefix.
    pub prefix: String,

    /// Expiry applied to every stored record. Refreshed on each store.
    pub ttl: Duration,

    /// Bound on the liveness probe made when connecting.
    pub connect_timeout: Duration,

    /// Bound on each durable-store command.
    pub command_timeout: Duration,

    /// Expire hot-tier entries `ttl` after insertion instead of keeping them
    /// until delete or restart.
    pub expire_hot_tier: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            password: None,
            db: 0,
            prefix: DEFAULT_PREFIX.to_string(),
            ttl: DEFAULT_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            expire_hot_tier: false,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace unset (empty or zero) values with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.addr.trim().is_empty() {
            self.addr = DEFAULT_ADDR.to_string();
        }
        if self.prefix.is_empty() {
            self.prefix = DEFAULT_PREFIX.to_string();
        }
        if self.ttl.is_zero() {
            self.ttl = DEFAULT_TTL;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.command_timeout.is_zero() {
            self.command_timeout = DEFAULT_COMMAND_TIMEOUT;
        }
        if self.password.as_deref() == Some("") {
            self.password = None;
        }
        self
    }

    /// Set the store address.
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the store password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the logical database index.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the record TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the connection probe timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Enable or disable hot-tier expiry.
    pub fn with_hot_tier_expiry(mut self, enabled: bool) -> Self {
        self.expire_hot_tier = enabled;
        self
    }

    /// Durable-tier key for a session.
    pub fn key_for(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_unset_values() {
        let config = StoreConfig {
            addr: String::new(),
            password: Some(String::new()),
            db: 2,
            prefix: String::new(),
            ttl: Duration::ZERO,
            connect_timeout: Duration::ZERO,
            command_timeout: Duration::ZERO,
            expire_hot_tier: false,
        }
        .with_defaults();

        assert_eq!(config.addr, "localhost:6379");
        assert_eq!(config.prefix, "mcp:session:");
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.password, None);
        assert_eq!(config.db, 2);
    }

    #[test]
    fn test_defaults_keep_set_values() {
        let config = StoreConfig::new()
            .with_addr("redis.internal:6380")
            .with_prefix("app:")
            .with_ttl(Duration::from_secs(60))
            .with_defaults();

        assert_eq!(config.addr, "redis.internal:6380");
        assert_eq!(config.prefix, "app:");
        assert_eq!(config.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_key_is_prefix_plus_raw_id() {
        let config = StoreConfig::new().with_prefix("p:");
        assert_eq!(config.key_for("abc"), "p:abc");
        assert_eq!(config.key_for(""), "p:");
    }
}
