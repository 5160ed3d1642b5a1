//! Application state shared across handlers.

use std::sync::Arc;

use tether_session::{KvStore, SessionCache};

use crate::config::ServerConfig;
use crate::owner::McpServer;

/// Durable tier shared by every handler, type-erased so tests can swap in
/// an in-memory store.
pub type SharedStore = Arc<dyn KvStore>;

/// Session cache as used by the server.
pub type SessionStore = SessionCache<McpServer, SharedStore>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session owner. Outlives the cache, which only holds a weak reference.
    pub server: Arc<McpServer>,

    /// Two-tier session cache.
    pub sessions: SessionStore,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(server: Arc<McpServer>, sessions: SessionStore, config: ServerConfig) -> Self {
        Self {
            server,
            sessions,
            config: Arc::new(config),
        }
    }
}
