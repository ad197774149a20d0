//! Database error types.
//!
//! Provides error handling for result persistence using `thiserror`.

use thiserror::Error;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create database connection.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Connection parameters could not be turned into a URL.
    #[error("invalid connection parameters: {0}")]
    InvalidParams(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Failed to decode database value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
