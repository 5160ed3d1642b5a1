//! MCP streamable-HTTP server with sessions shared through Redis.
//!
//! Sessions are held by a [`tether_session::SessionCache`]: live handles in
//! this process, serialized records in the durable store. Any instance behind
//! a load balancer can serve any session.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_server::{AppState, Server, ServerConfig, SharedStore, session_server};
//! use tether_session::{RedisStore, SessionCache, StoreConfig};
//!
//! let owner = Arc::new(session_server());
//! let store_config = StoreConfig::new().with_defaults();
//! let store = RedisStore::connect(&store_config).await?;
//! let sessions = SessionCache::builder(store_config)
//!     .owner(&owner)
//!     .with_connected_store(Arc::new(store) as SharedStore)?;
//!
//! let server = Server::new(AppState::new(owner, sessions, ServerConfig::new()));
//! server.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod owner;
pub mod protocol;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use owner::{McpServer, McpSession, session_server};
pub use state::{AppState, SessionStore, SharedStore};

use std::future::{Future, IntoFuture};

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server from prepared state.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        use axum::routing::post;

        Router::new()
            .merge(routes::health_routes())
            .route(
                "/mcp",
                post(routes::mcp_handler).delete(routes::delete_session_handler),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until SIGINT or SIGTERM, then close the session cache.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// In-flight requests get the configured grace period to finish; the
    /// session cache is closed once afterwards, whether or not serving
    /// succeeded.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let served = self.serve(shutdown).await;

        // A serve error takes precedence over a close error.
        let closed = self.state.sessions.close().await;
        served?;
        closed?;
        info!("Server stopped");
        Ok(())
    }

    async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind_address();
        let grace = self.state.config.shutdown_grace;
        let router = self.router();

        info!("Starting server on {}", addr);

        let listener = TcpListener::bind((self.state.config.host.as_str(), self.state.config.port))
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {addr}: {e}")))?;

        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown requested, draining in-flight requests");
                let _ = signalled_tx.send(());
            })
            .into_future();
        tokio::pin!(serve);

        let grace_elapsed = async move {
            match signalled_rx.await {
                Ok(()) => tokio::time::sleep(grace).await,
                Err(_) => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = &mut serve => {
                result.map_err(|e| ServerError::Internal(format!("Server error: {e}")))
            }
            _ = grace_elapsed => {
                warn!(grace_secs = grace.as_secs(), "Shutdown grace elapsed, abandoning open connections");
                Ok(())
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tether_session::{MemoryStore, SessionCache, StoreConfig};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let owner = Arc::new(session_server());
        let store: SharedStore = Arc::new(MemoryStore::new());
        let sessions = SessionCache::builder(StoreConfig::new())
            .owner(&owner)
            .with_store(store)
            .await
            .unwrap();
        AppState::new(owner, sessions, ServerConfig::new().with_host("127.0.0.1").with_port(0))
    }

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let server = Server::new(test_state().await);

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_run_until_closes_sessions() {
        let state = test_state().await;
        let sessions = state.sessions.clone();
        let server = Server::new(state);

        server
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();

        assert!(sessions.health().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_bind_still_closes_sessions() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut state = test_state().await;
        state.config = Arc::new(ServerConfig::new().with_host("127.0.0.1").with_port(port));
        let sessions = state.sessions.clone();

        let result = Server::new(state).run_until(std::future::pending()).await;

        assert!(matches!(result, Err(ServerError::Internal(_))));
        assert!(sessions.health().await.is_err());
    }
}
