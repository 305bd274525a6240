//! `medbridge migrate` command implementation
//!
//! Validates the primary store and bulk-copies it into the secondary store.

use anyhow::{Context, Result};
use medbridge_common::types::SchemaName;
use medbridge_migrate::{
    MigrateConfig, MigrationEngine, MigrationOutcome, MigrationReport, SecondaryConfig,
    SecondaryStore,
};
use tokio_util::sync::CancellationToken;

use crate::{Cli, MigrateArgs};

/// Run the migration and print its summary
pub async fn run(
    cli: &Cli,
    args: &MigrateArgs,
    cancel: CancellationToken,
) -> Result<MigrationOutcome> {
    let (secondary_config, config) = resolve_config(args)?;

    let primary = super::open_primary(cli).await?;
    let secondary = SecondaryStore::connect(&secondary_config)
        .await
        .context("Failed to connect to the secondary store")?;

    let mut engine = MigrationEngine::new(primary.clone(), secondary.clone(), config, cancel);
    let result = engine.run().await;
    primary.close().await;
    secondary.close().await;

    let outcome = result.with_context(|| format!("Migration stopped in state {}", engine.state()))?;
    print_outcome(&outcome);
    Ok(outcome)
}

fn resolve_config(args: &MigrateArgs) -> Result<(SecondaryConfig, MigrateConfig)> {
    let mut secondary =
        SecondaryConfig::from_env().context("Invalid secondary store configuration")?;
    if let Some(url) = &args.pg_url {
        secondary.url = url.clone();
    }
    if let Some(schema) = &args.schema {
        secondary.schema = SchemaName::parse(schema).context("Invalid --schema")?;
    }
    secondary
        .validate()
        .context("Invalid secondary store configuration")?;

    let mut config = MigrateConfig::from_env().context("Invalid migration configuration")?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(top_n) = args.top_n {
        config.top_n = top_n;
    }
    config.validate().context("Invalid migration configuration")?;

    Ok((secondary, config))
}

fn print_outcome(outcome: &MigrationOutcome) {
    match outcome {
        MigrationOutcome::AlreadyMigrated => {
            println!("Secondary store is already migrated; nothing to do.");
        }
        MigrationOutcome::Completed(report) => {
            println!("Migration summary:");
            print_report(report);
        }
        MigrationOutcome::Cancelled(report) => {
            println!("Migration cancelled. Committed tables are kept and skipped on the next run.");
            print_report(report);
        }
    }
}

fn print_report(report: &MigrationReport) {
    for stats in &report.copy.tables {
        if stats.skipped {
            println!("  {:<18} already populated, skipped", stats.table.name());
        } else {
            println!(
                "  {:<18} {} rows in {:.1}s",
                stats.table.name(),
                stats.rows,
                stats.elapsed.as_secs_f64()
            );
        }
    }
    println!("  Rows copied:        {}/{}", report.copy.rows(), report.plan.total());
    println!("  Indexes rebuilt:    {}", report.indexes_rebuilt);
    if let Some(aggregates) = &report.aggregates {
        println!(
            "  Aggregates:         {} conditions, {} medication orders, {} demographic categories",
            aggregates.top_conditions.len(),
            aggregates.top_medication_orders.len(),
            aggregates.demographics.len()
        );
    }
    println!("  Elapsed:            {:.1}s", report.elapsed.as_secs_f64());
}
