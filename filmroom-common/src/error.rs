//! Common error types for filmroom

use thiserror::Error;

/// Common result type for filmroom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across filmroom crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decode error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
