//! Error types for the ingestion phase

use medbridge_common::MedbridgeError;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while listing, staging or loading bundle files
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Malformed catalog page {page}: {reason}")]
    MalformedCatalog { page: u32, reason: String },

    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] MedbridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Create a parse error for a named file
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Failure talking to the remote catalog or file host
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::UnexpectedStatus { .. } | Self::MalformedCatalog { .. }
        )
    }
}
