//! Error types shared across the engine.
//!
//! Every recoverable condition maps onto one of these kinds so that transport
//! adapters can translate uniformly (JSON-RPC error codes, HTTP statuses).

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Boundary input violated a constraint
    #[error("validation error: {0}")]
    Validation(String),
    /// No row matched the given identifier
    #[error("not found: {0}")]
    NotFound(String),
    /// A unique constraint was violated
    #[error("conflict: {0}")]
    Conflict(String),
    /// An external collaborator (embedder, vector index, chat) is down
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// A token bucket was exhausted
    #[error("rate limited ({limit_type}), retry after {retry_after_ms}ms")]
    RateLimited {
        limit_type: String,
        retry_after_ms: u64,
    },
    /// Request body exceeded the configured limit
    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Invariant violation or unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        CoreError::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }

    /// Rebuild an owned error of the same kind from a shared reference.
    ///
    /// Used by the single-flight layer, which broadcasts one outcome to many
    /// waiters. Source-carrying variants collapse to `Internal` with the
    /// rendered message; the kinds transports dispatch on survive intact.
    pub fn from_shared(err: &CoreError) -> CoreError {
        match err {
            CoreError::Validation(m) => CoreError::Validation(m.clone()),
            CoreError::NotFound(m) => CoreError::NotFound(m.clone()),
            CoreError::Conflict(m) => CoreError::Conflict(m.clone()),
            CoreError::ServiceUnavailable(m) => CoreError::ServiceUnavailable(m.clone()),
            CoreError::RateLimited {
                limit_type,
                retry_after_ms,
            } => CoreError::RateLimited {
                limit_type: limit_type.clone(),
                retry_after_ms: *retry_after_ms,
            },
            CoreError::PayloadTooLarge { size, limit } => CoreError::PayloadTooLarge {
                size: *size,
                limit: *limit,
            },
            other => CoreError::Internal(other.to_string()),
        }
    }
}
