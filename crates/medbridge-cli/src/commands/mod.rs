//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod ingest;
pub mod migrate;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use medbridge_common::store::{PrimaryConfig, PrimaryStore};

use crate::Cli;

/// Open the primary store, honouring `--primary-db`
pub(crate) async fn open_primary(cli: &Cli) -> Result<PrimaryStore> {
    let mut config = PrimaryConfig::from_env().context("Invalid primary store configuration")?;
    if let Some(path) = &cli.primary_db {
        config.path = path.clone();
    }

    PrimaryStore::open(&config)
        .await
        .with_context(|| format!("Failed to open primary store at {}", config.path.display()))
}
