//! Error types for session cache operations.

/// Boxed error returned by a session owner that refuses a reattachment.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised by a durable-tier adapter.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The backend rejected or failed the command.
    #[error("backend error: {0}")]
    Backend(String),

    /// The command did not complete within the adapter's bound.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The adapter was closed before the command ran.
    #[error("connection closed")]
    Closed,
}

impl From<redis::RedisError> for KvError {
    fn from(e: redis::RedisError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Error type for session cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid construction input.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The durable tier could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No record exists for the session in either tier.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A durable-tier operation failed for a reason other than absence.
    #[error("Storage error during {op} for session {session_id}: {source}")]
    Storage {
        /// Operation that failed (`load`, `store`, `delete`).
        op: &'static str,
        /// Session the operation targeted.
        session_id: String,
        /// Underlying adapter error.
        #[source]
        source: KvError,
    },

    /// The session record could not be encoded.
    #[error("Failed to serialize session {session_id}: {source}")]
    Serialization {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stored bytes could not be decoded into a session record.
    #[error("Failed to deserialize session {session_id}: {source}")]
    Deserialization {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The session owner refused or failed to reattach a record.
    #[error("Failed to reattach session {session_id}: {source}")]
    Reattach {
        session_id: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Build a storage error for the given operation.
    pub fn storage(op: &'static str, session_id: impl Into<String>, source: KvError) -> Self {
        Self::Storage {
            op,
            session_id: session_id.into(),
            source,
        }
    }

    /// Whether this is the normal "session absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error came from the durable tier during an operation.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// Result type for session cache operations.
pub type Result<T> = std::result::Result<T, Error>;
