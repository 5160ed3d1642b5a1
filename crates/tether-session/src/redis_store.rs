//! Redis-backed durable tier.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{
    ConnectionAddr, ConnectionInfo, FromRedisValue, IntoConnectionInfo, RedisConnectionInfo,
};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Error, KvError, Result};
use crate::store::{KvResult, KvStore};

const DEFAULT_PORT: u16 = 6379;

/// [`KvStore`] backed by a Redis server.
///
/// Holds one multiplexed [`ConnectionManager`] for its lifetime; the manager
/// reconnects on its own after transient failures and is cloned per command.
pub struct RedisStore {
    conn: RwLock<Option<ConnectionManager>>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect and verify the server answers `PING` within
    /// `config.connect_timeout`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let info = connection_info(config)?;
        let client = redis::Client::open(info)
            .map_err(|e| Error::Configuration(format!("invalid Redis address '{}': {e}", config.addr)))?;

        let probe = async {
            let mut conn = ConnectionManager::new(client).await?;
            let _: () = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        };

        let conn = match tokio::time::timeout(config.connect_timeout, probe).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(Error::Connection(format!(
                    "failed to connect to Redis at {}: {e}",
                    config.addr
                )));
            }
            Err(_) => {
                return Err(Error::Connection(format!(
                    "timed out after {:?} connecting to Redis at {}",
                    config.connect_timeout, config.addr
                )));
            }
        };

        info!(addr = %config.addr, db = config.db, "Connected to Redis");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            command_timeout: config.command_timeout,
        })
    }

    fn connection(&self) -> KvResult<ConnectionManager> {
        self.conn.read().clone().ok_or(KvError::Closed)
    }

    async fn run<T: FromRedisValue + Send>(&self, cmd: redis::Cmd) -> KvResult<T> {
        let mut conn = self.connection()?;
        match tokio::time::timeout(self.command_timeout, cmd.query_async(&mut conn)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(KvError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> KvResult<()> {
        // PX keeps sub-second TTLs; Redis rejects a zero expiry.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.as_slice()).arg("PX").arg(millis);
        self.run(cmd).await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let _removed: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.run(cmd).await?;
        Ok(count > 0)
    }

    async fn ping(&self) -> KvResult<()> {
        self.run(redis::cmd("PING")).await
    }

    async fn close(&self) -> KvResult<()> {
        if self.conn.write().take().is_some() {
            debug!("Redis connection released");
        }
        Ok(())
    }
}

/// Build connection parameters from `host:port` or a `redis://` URL, with
/// explicit password and database settings taking precedence over the URL.
fn connection_info(config: &StoreConfig) -> Result<ConnectionInfo> {
    let mut info = if config.addr.contains("://") {
        config
            .addr
            .as_str()
            .into_connection_info()
            .map_err(|e| Error::Configuration(format!("invalid Redis URL '{}': {e}", config.addr)))?
    } else {
        let (host, port) = split_host_port(&config.addr)?;
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo::default(),
        }
    };

    if config.db != 0 {
        info.redis.db = config.db;
    }
    if let Some(password) = &config.password {
        info.redis.password = Some(password.clone());
    }
    Ok(info)
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    match addr.rsplit_once(':') {
        // Bare IPv6 without brackets has no port
        Some((host, _)) if host.contains(':') && !host.ends_with(']') => {
            Ok((addr.to_string(), DEFAULT_PORT))
        }
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                Error::Configuration(format!("invalid port in Redis address '{addr}'"))
            })?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), DEFAULT_PORT)),
    }
}
