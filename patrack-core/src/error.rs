//! Error types for patrack-core

use thiserror::Error;

/// Main error type for the patrack-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Key/value storage is unavailable or refused a write
    #[error("storage error: {0}")]
    Storage(String),

    /// Collector transport error
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for patrack-core
pub type Result<T> = std::result::Result<T, Error>;
