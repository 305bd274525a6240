//! medbridge Migrate Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Bulk migration of the primary store into a PostgreSQL secondary store.
//!
//! # Overview
//!
//! - **Validation**: refuses to migrate orphaned or unidentified rows
//! - **Indexes**: secondary indexes are dropped for the load and rebuilt from their captured definitions
//! - **Bulk copy**: per-table `COPY` streams on a bounded worker pool, each in its own transaction
//! - **Aggregates**: top-N label frequencies and demographic counts, replaced wholesale
//!
//! # Example
//!
//! ```no_run
//! use medbridge_common::store::{PrimaryConfig, PrimaryStore};
//! use medbridge_migrate::{MigrateConfig, MigrationEngine, SecondaryConfig, SecondaryStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let primary = PrimaryStore::open(&PrimaryConfig::from_env()?).await?;
//!     let secondary = SecondaryStore::connect(&SecondaryConfig::from_env()?).await?;
//!     let mut engine = MigrationEngine::new(
//!         primary,
//!         secondary,
//!         MigrateConfig::from_env()?,
//!         CancellationToken::new(),
//!     );
//!     let outcome = engine.run().await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod aggregates;
pub mod config;
pub mod copy;
pub mod db;
pub mod engine;
pub mod error;
pub mod indexes;
pub mod state;
pub mod validate;

pub use config::{MigrateConfig, SecondaryConfig};
pub use db::SecondaryStore;
pub use engine::{MigrationEngine, MigrationOutcome, MigrationReport};
pub use error::{MigrateError, Result};
pub use state::MigrationState;
pub use validate::IntegrityReport;
