//! Ingestion pipeline driver
//!
//! Lists the catalog, subtracts the ledger, then runs the download and load
//! workers as two tasks joined by a bounded handoff channel.

use medbridge_common::store::PrimaryStore;
use medbridge_common::RunContext;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use crate::catalog::CatalogClient;
use crate::download::{run_staging_dir, DownloadWorker};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::loader::LoadWorker;

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub catalog_files: usize,
    pub already_processed: usize,
    pub queued: u64,
    pub downloaded: u64,
    pub download_failures: u64,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub cancelled: bool,
    pub staging_dir: Option<PathBuf>,
    pub elapsed: Duration,
}

/// One ingestion pass over the remote catalog
pub struct IngestPipeline {
    catalog: CatalogClient,
    store: PrimaryStore,
    ctx: Arc<RunContext>,
}

impl IngestPipeline {
    pub fn new(catalog: CatalogClient, store: PrimaryStore, ctx: Arc<RunContext>) -> Self {
        Self {
            catalog,
            store,
            ctx,
        }
    }

    /// Run to completion (or cancellation)
    ///
    /// A catalog failure aborts before anything is staged. Per-file failures
    /// only show up in the report counters.
    pub async fn run(&self) -> Result<IngestReport> {
        let started = Instant::now();

        let catalog = self.catalog.list_files().await?;
        let ledger = Ledger::new(self.store.pool().clone());
        let (work, already_processed) = ledger.pending(&catalog).await?;

        info!(
            catalog_files = catalog.len(),
            already_processed,
            to_download = work.len(),
            "Work list computed"
        );

        if work.is_empty() {
            return Ok(self.report(catalog.len(), already_processed, None, started));
        }

        let config = self.catalog.config();
        let staging_dir = run_staging_dir(&config.staging_dir);
        self.ctx.set_queued(work.len() as u64);

        // The load worker owns its own connection, never the shared pool
        let conn = self.store.connect_private().await?;
        let (tx, rx) = mpsc::channel(config.handoff_capacity);

        let downloader = DownloadWorker::new(
            self.catalog.http().clone(),
            config.raw_base()?,
            staging_dir.clone(),
            Arc::clone(&self.ctx),
        );
        let loader = LoadWorker::new(conn, Arc::clone(&self.ctx));

        let download_task = tokio::spawn(downloader.run(work, tx));
        let load_task = tokio::spawn(loader.run(rx));

        let (downloaded, loaded) = tokio::join!(download_task, load_task);
        self.ctx.finish_progress();
        downloaded??;
        loaded??;

        let report = self.report(catalog.len(), already_processed, Some(staging_dir), started);
        info!(
            processed = report.processed,
            skipped = report.skipped,
            errors = report.errors,
            download_failures = report.download_failures,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Ingestion finished"
        );
        Ok(report)
    }

    fn report(
        &self,
        catalog_files: usize,
        already_processed: usize,
        staging_dir: Option<PathBuf>,
        started: Instant,
    ) -> IngestReport {
        let snapshot = self.ctx.snapshot();
        IngestReport {
            catalog_files,
            already_processed,
            queued: snapshot.queued,
            downloaded: snapshot.downloaded,
            download_failures: snapshot.download_failures,
            processed: snapshot.processed,
            skipped: snapshot.skipped,
            errors: snapshot.errors,
            cancelled: self.ctx.is_cancelled(),
            staging_dir,
            elapsed: started.elapsed(),
        }
    }
}
