//! HTTP route handlers.

pub mod health;
pub mod mcp;

pub use health::{HealthResponse, ReadinessResponse, health_routes};
pub use mcp::{delete_session_handler, mcp_handler};
