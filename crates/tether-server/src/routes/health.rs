//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Liveness response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Server name.
    pub name: String,
    /// Service version.
    pub version: String,
}

/// Readiness response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Readiness status.
    pub status: String,
    /// Sessions attached to this process.
    pub active_sessions: usize,
}

/// Simple liveness check; never touches the session store.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let info = state.server.info();
    Json(HealthResponse {
        status: "ok".to_string(),
        name: info.name.clone(),
        version: info.version.clone(),
    })
}

/// Readiness check: 503 while the session store is unreachable.
pub async fn ready(State(state): State<AppState>) -> Result<Json<ReadinessResponse>> {
    state
        .sessions
        .health()
        .await
        .map_err(|e| ServerError::ServiceUnavailable(e.to_string()))?;

    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        active_sessions: state.server.active_sessions(),
    }))
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(ready))
}
