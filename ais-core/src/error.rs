//! Error types for ais-core

use thiserror::Error;

/// Main error type for the ais-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for a transcript file
    #[error("parse error in {format} log: {message}")]
    Parse { format: String, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Query rejected before reaching the store
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type alias for ais-core
pub type Result<T> = std::result::Result<T, Error>;
