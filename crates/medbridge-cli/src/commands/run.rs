//! `medbridge run` command implementation
//!
//! Ingestion followed by migration. A cancelled ingestion skips the migration.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{Cli, IngestArgs, MigrateArgs};

pub async fn run(
    cli: &Cli,
    ingest: &IngestArgs,
    migrate: &MigrateArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let report = super::ingest::run(cli, ingest, cancel.clone()).await?;

    if report.cancelled || cancel.is_cancelled() {
        warn!("Ingestion was cancelled, not starting the migration");
        println!("Migration skipped because ingestion was cancelled.");
        return Ok(());
    }

    println!();
    super::migrate::run(cli, migrate, cancel).await?;
    Ok(())
}
