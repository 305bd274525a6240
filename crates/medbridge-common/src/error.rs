//! Error types for medbridge

use thiserror::Error;

/// Result type alias for medbridge operations
pub type Result<T> = std::result::Result<T, MedbridgeError>;

/// Main error type for medbridge
#[derive(Error, Debug)]
pub enum MedbridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Store migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid identifier '{0}': expected lowercase letters, digits and underscores, starting with a letter or underscore (max 63 chars)")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl MedbridgeError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
