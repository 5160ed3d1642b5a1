//! Server command - runs the MCP HTTP server with Redis session storage.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use tether_server::{AppState, Server, ServerConfig, SharedStore, session_server};
use tether_session::{DEFAULT_PREFIX, RedisStore, SessionCache, StoreConfig};

/// Arguments for the server command.
///
/// Every flag falls back to its environment variable.
#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Host to bind to
    #[arg(short = 'H', long, env = "MCP_HOST", default_value = "localhost")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "MCP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Redis address, host:port or redis:// URL (required)
    #[arg(long, env = "REDIS_ADDR")]
    pub redis_addr: Option<String>,

    /// Redis password
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Redis database number
    #[arg(long, env = "REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    /// Redis key prefix for sessions
    #[arg(long, env = "REDIS_PREFIX", default_value = DEFAULT_PREFIX)]
    pub redis_prefix: String,

    /// Session TTL, e.g. 30m, 1h, 90s
    #[arg(long, env = "REDIS_TTL", default_value = "1h", value_parser = humantime::parse_duration)]
    pub redis_ttl: Duration,
}

impl ServerArgs {
    /// Session store configuration. Fails when no Redis address was given.
    pub fn store_config(&self) -> Result<StoreConfig> {
        let Some(addr) = self.redis_addr.as_deref().filter(|a| !a.trim().is_empty()) else {
            bail!(
                "Redis address is required. Set REDIS_ADDR environment variable or use --redis-addr flag"
            );
        };

        let mut config = StoreConfig::new()
            .with_addr(addr)
            .with_db(self.redis_db)
            .with_prefix(&self.redis_prefix)
            .with_ttl(self.redis_ttl);
        if let Some(password) = &self.redis_password {
            config = config.with_password(password);
        }
        Ok(config.with_defaults())
    }

    /// HTTP server configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new()
            .with_host(&self.host)
            .with_port(self.port)
    }
}

/// Run the server until interrupted.
pub async fn run(args: ServerArgs) -> Result<()> {
    let store_config = args.store_config()?;
    let owner = Arc::new(session_server());

    info!(
        addr = %store_config.addr,
        db = store_config.db,
        prefix = %store_config.prefix,
        ttl = %humantime::format_duration(store_config.ttl),
        "Configuring Redis session storage"
    );

    // `connect` already probed Redis, so the cache is built without a second PING.
    let store = RedisStore::connect(&store_config)
        .await
        .context("Failed to initialize Redis session store")?;
    let store: SharedStore = Arc::new(store);

    let sessions = SessionCache::builder(store_config)
        .owner(&owner)
        .with_connected_store(store)
        .context("Failed to initialize session cache")?;

    let state = AppState::new(owner, sessions, args.server_config());
    Server::new(state).run().await.context("Server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServerArgs,
    }

    fn parse(argv: &[&str]) -> ServerArgs {
        let mut full = vec!["tether"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_flags_build_store_config() {
        let args = parse(&[
            "--redis-addr",
            "cache:6380",
            "--redis-db",
            "2",
            "--redis-prefix",
            "app:",
            "--redis-ttl",
            "30m",
            "--redis-password",
            "secret",
        ]);
        let config = args.store_config().unwrap();

        assert_eq!(config.addr, "cache:6380");
        assert_eq!(config.db, 2);
        assert_eq!(config.prefix, "app:");
        assert_eq!(config.ttl, Duration::from_secs(30 * 60));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_server_flags() {
        let args = parse(&["-H", "0.0.0.0", "-p", "9000", "--redis-addr", "cache:6379"]);
        assert_eq!(args.server_config().bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_compound_ttl() {
        let args = parse(&["--redis-addr", "cache:6379", "--redis-ttl", "1h 30m"]);
        assert_eq!(args.redis_ttl, Duration::from_secs(90 * 60));
    }

    #[test]
    fn test_missing_redis_addr_is_rejected() {
        let mut args = parse(&["--redis-addr", "cache:6379"]);
        args.redis_addr = None;
        let err = args.store_config().unwrap_err();
        assert!(err.to_string().contains("REDIS_ADDR"));

        args.redis_addr = Some("  ".to_string());
        assert!(args.store_config().is_err());
    }
}
