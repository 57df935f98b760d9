//! Error types for the persistence layer.

use thiserror::Error;

/// Persistence operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Persistence errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (creating the state directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON column failed to decode
    #[error("Corrupt stored JSON: {0}")]
    CorruptJson(#[from] serde_json::Error),

    /// Invalid state transition
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DbError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
