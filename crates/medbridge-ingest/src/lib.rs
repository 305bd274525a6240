//! medbridge Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls clinical-record bundles from a remote catalog into the primary store,
//! exactly once per file.
//!
//! # Flow
//!
//! - **Catalog**: paginated contents listing, filtered to eligible files
//! - **Ledger**: names of files already committed; the work list is the catalog minus the ledger
//! - **Download worker**: stages each file and hands its path over a bounded channel
//! - **Load worker**: parses each bundle and commits its entities with its ledger entry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use medbridge_common::store::{PrimaryConfig, PrimaryStore};
//! use medbridge_common::RunContext;
//! use medbridge_ingest::{CatalogClient, IngestConfig, IngestPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = PrimaryStore::open(&PrimaryConfig::from_env()?).await?;
//!     let catalog = CatalogClient::new(IngestConfig::from_env()?)?;
//!     let report = IngestPipeline::new(catalog, store, Arc::new(RunContext::new())).run().await?;
//!     println!("processed {} files", report.processed);
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod pipeline;

pub use catalog::{CatalogClient, CatalogEntry};
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use ledger::Ledger;
pub use pipeline::{IngestPipeline, IngestReport};
