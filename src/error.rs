//! Error types for fcgi-engine.

use thiserror::Error;

/// Main error type for all engine operations.
#[derive(Debug, Error)]
pub enum FcgiError {
    /// I/O error on the listening socket or a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed record or name-value block.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Every connection slot is bound to a transport.
    #[error("Connection pool exhausted ({capacity} slots in use)")]
    PoolExhausted {
        /// Number of slots in the pool.
        capacity: usize,
    },
}

/// Result type alias using FcgiError.
pub type Result<T> = std::result::Result<T, FcgiError>;
