//! `medbridge ingest` command implementation
//!
//! One ingestion pass: catalog walk, download, parse and load.

use anyhow::{Context, Result};
use medbridge_common::RunContext;
use medbridge_ingest::{CatalogClient, IngestConfig, IngestPipeline, IngestReport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{Cli, IngestArgs};

/// Run one ingestion pass and print its summary
pub async fn run(cli: &Cli, args: &IngestArgs, cancel: CancellationToken) -> Result<IngestReport> {
    let config = resolve_config(args)?;
    let store = super::open_primary(cli).await?;
    let catalog = CatalogClient::new(config).context("Failed to build catalog client")?;

    let mut ctx = RunContext::with_token(cancel);
    if cli.progress_enabled() {
        ctx = ctx.with_progress_bars();
    }

    let pipeline = IngestPipeline::new(catalog, store.clone(), Arc::new(ctx));
    let result = pipeline.run().await;
    store.close().await;

    let report = result.context("Ingestion run failed")?;
    print_report(&report);
    Ok(report)
}

fn resolve_config(args: &IngestArgs) -> Result<IngestConfig> {
    let mut config = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    if let Some(url) = &args.catalog_url {
        config.catalog_url = url.clone();
    }
    if let Some(url) = &args.raw_base_url {
        config.raw_base_url = url.clone();
    }
    if let Some(dir) = &args.staging_dir {
        config.staging_dir = dir.clone();
    }
    config.validate().context("Invalid ingestion configuration")?;
    Ok(config)
}

fn print_report(report: &IngestReport) {
    if report.queued == 0 {
        println!(
            "Nothing to ingest: {} catalog files, all already processed.",
            report.catalog_files
        );
        return;
    }

    println!("Ingestion summary:");
    println!("  Catalog files:      {}", report.catalog_files);
    println!("  Already processed:  {}", report.already_processed);
    println!("  Downloaded:         {}/{}", report.downloaded, report.queued);
    println!("  Download failures:  {}", report.download_failures);
    println!("  Processed:          {}", report.processed);
    println!("  Skipped:            {}", report.skipped);
    println!("  Errors:             {}", report.errors);
    if let Some(dir) = &report.staging_dir {
        println!("  Staging directory:  {}", dir.display());
    }
    println!("  Elapsed:            {:.1}s", report.elapsed.as_secs_f64());
    if report.cancelled {
        println!("Run was cancelled; remaining files will be picked up next time.");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_environment_defaults() {
        let args = IngestArgs {
            catalog_url: Some("http://127.0.0.1:9/contents".into()),
            raw_base_url: None,
            staging_dir: Some(PathBuf::from("/tmp/medbridge-stage")),
        };

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.catalog_url, "http://127.0.0.1:9/contents");
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/medbridge-stage"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = IngestArgs {
            catalog_url: Some("not a url".into()),
            ..IngestArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }
}
