//! Error handling module
//!
//! Provides the unified error type shared by every component of the tool.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("Duplicate table name in snapshot: {0}")]
    DuplicateTable(String),

    #[error("Operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the crate
pub type SchemaResult<T> = Result<T, SchemaError>;
