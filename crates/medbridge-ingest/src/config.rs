//! Ingestion configuration
//!
//! Where the catalog lives, where files are staged and how the two workers
//! are sized. Values come from `MEDBRIDGE_*` environment variables with the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Ingestion Constants
// ============================================================================

/// Contents listing of the bundle corpus.
pub const DEFAULT_CATALOG_URL: &str =
    "https://api.github.com/repos/wandersondsm/teste_engenheiro/contents/data";

/// Branch or tag the listing is read at.
pub const DEFAULT_CATALOG_REF: &str = "main";

/// Base URL raw file contents are fetched from (file name is joined onto it).
pub const DEFAULT_RAW_BASE_URL: &str =
    "https://raw.githubusercontent.com/wandersondsm/teste_engenheiro/main/data/";

/// Only catalog entries with this extension are ingested.
pub const DEFAULT_FILE_EXTENSION: &str = ".json";

/// Entries requested per catalog page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Per-request ceiling for catalog and file requests, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Root under which each run creates its staging directory.
pub const DEFAULT_STAGING_DIR: &str = "./data";

/// Staged paths buffered between the download and load workers.
pub const DEFAULT_HANDOFF_CAPACITY: usize = 64;

/// User agent sent with every request (the contents API rejects anonymous clients).
pub const DEFAULT_USER_AGENT: &str = concat!("medbridge/", env!("CARGO_PKG_VERSION"));

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Paginated contents listing endpoint
    pub catalog_url: String,
    /// Value of the `ref` query parameter; empty to omit it
    pub catalog_ref: String,
    /// Raw content base URL
    pub raw_base_url: String,
    /// Accepted file extension, including the dot
    pub file_extension: String,
    /// Catalog page size
    pub page_size: u32,
    /// Per-request timeout in seconds
    pub http_timeout_secs: u64,
    /// Staging root
    pub staging_dir: PathBuf,
    /// Bound of the handoff channel
    pub handoff_capacity: usize,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            catalog_ref: DEFAULT_CATALOG_REF.to_string(),
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            catalog_url: std::env::var("MEDBRIDGE_CATALOG_URL").unwrap_or(defaults.catalog_url),
            catalog_ref: std::env::var("MEDBRIDGE_CATALOG_REF").unwrap_or(defaults.catalog_ref),
            raw_base_url: std::env::var("MEDBRIDGE_RAW_BASE_URL")
                .unwrap_or(defaults.raw_base_url),
            file_extension: std::env::var("MEDBRIDGE_FILE_EXTENSION")
                .unwrap_or(defaults.file_extension),
            page_size: std::env::var("MEDBRIDGE_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE),
            http_timeout_secs: std::env::var("MEDBRIDGE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            staging_dir: std::env::var("MEDBRIDGE_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            handoff_capacity: std::env::var("MEDBRIDGE_HANDOFF_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HANDOFF_CAPACITY),
            user_agent: defaults.user_agent,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.catalog_url.is_empty() {
            return Err(IngestError::config("Catalog URL cannot be empty"));
        }
        url::Url::parse(&self.catalog_url)?;
        url::Url::parse(&self.raw_base_url)?;

        if !self.file_extension.starts_with('.') || self.file_extension.len() < 2 {
            return Err(IngestError::config(format!(
                "File extension must start with '.', got '{}'",
                self.file_extension
            )));
        }

        if self.page_size == 0 || self.page_size > 100 {
            return Err(IngestError::config(
                "Catalog page size must be between 1 and 100",
            ));
        }

        if self.http_timeout_secs == 0 {
            return Err(IngestError::config("HTTP timeout must be greater than 0"));
        }

        if self.handoff_capacity == 0 {
            return Err(IngestError::config(
                "Handoff capacity must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Raw base URL with a guaranteed trailing slash, so joining keeps the last segment
    pub fn raw_base(&self) -> Result<url::Url> {
        let mut base = self.raw_base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(url::Url::parse(&base)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 100);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = IngestConfig {
            page_size: 0,
            ..IngestConfig::default()
        };
        assert!(config.validate().is_err());

        config.page_size = 100;
        config.file_extension = "json".into();
        assert!(config.validate().is_err());

        config.file_extension = ".json".into();
        config.raw_base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_raw_base_gets_trailing_slash() {
        let config = IngestConfig {
            raw_base_url: "https://example.org/corpus/data".into(),
            ..IngestConfig::default()
        };
        let joined = config.raw_base().unwrap().join("a.json").unwrap();
        assert_eq!(joined.as_str(), "https://example.org/corpus/data/a.json");
    }
}
