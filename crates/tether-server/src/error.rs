//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Session cache failure.
    #[error(transparent)]
    Session(#[from] tether_session::Error),

    /// Service unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ServerError {
    /// HTTP status and machine-readable code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        use tether_session::Error as SessionError;

        match self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::Session(e) => match e {
                SessionError::NotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
                SessionError::Storage { .. } | SessionError::Connection(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "session_store_unavailable")
                }
                SessionError::Deserialization { .. } | SessionError::Serialization { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "session_corrupt")
                }
                SessionError::Reattach { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "session_reattach_failed")
                }
                SessionError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "config_error")
                }
            },
            ServerError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_session::{Error as SessionError, KvError};

    #[test]
    fn test_session_errors_map_to_status() {
        let not_found: ServerError = SessionError::NotFound("abc".into()).into();
        assert_eq!(not_found.status().0, StatusCode::NOT_FOUND);

        let storage: ServerError =
            SessionError::storage("load", "abc", KvError::Backend("refused".into())).into();
        assert_eq!(storage.status().0, StatusCode::SERVICE_UNAVAILABLE);

        let reattach: ServerError = SessionError::Reattach {
            session_id: "abc".into(),
            source: "no".into(),
        }
        .into();
        assert_eq!(reattach.status().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display_is_transparent_for_session_errors() {
        let err: ServerError = SessionError::NotFound("abc".into()).into();
        assert_eq!(err.to_string(), "Session not found: abc");
    }

    #[test]
    fn test_into_response_status() {
        let response = ServerError::BadRequest("missing header".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
