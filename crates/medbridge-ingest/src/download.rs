//! Download worker
//!
//! Fetches each pending file once, stages it on disk and hands the staged
//! path to the load worker. A failed fetch removes the partial file and moves
//! on. Dropping the sender when the loop ends closes the handoff channel,
//! which is how the load worker learns there is no more work.

use chrono::Utc;
use futures::StreamExt;
use medbridge_common::RunContext;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::catalog::CatalogEntry;
use crate::error::{IngestError, Result};

/// A fully written file waiting to be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub path: PathBuf,
}

/// Per-run staging directory `<root>/data_process_<YYYYmmdd_HHMMSS>`
pub fn run_staging_dir(root: &Path) -> PathBuf {
    root.join(format!("data_process_{}", Utc::now().format("%Y%m%d_%H%M%S")))
}

/// Producer side of the handoff channel
pub struct DownloadWorker {
    client: Client,
    raw_base: Url,
    staging_dir: PathBuf,
    ctx: Arc<RunContext>,
}

impl DownloadWorker {
    pub fn new(client: Client, raw_base: Url, staging_dir: PathBuf, ctx: Arc<RunContext>) -> Self {
        Self {
            client,
            raw_base,
            staging_dir,
            ctx,
        }
    }

    /// Stage every entry in order, sending each staged path downstream
    ///
    /// Returns the number of files handed off. Stops early when the run is
    /// cancelled or the receiver has gone away.
    pub async fn run(self, work: Vec<CatalogEntry>, handoff: mpsc::Sender<StagedFile>) -> Result<u64> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        info!(
            files = work.len(),
            staging_dir = %self.staging_dir.display(),
            "Download worker started"
        );

        let mut handed_off = 0u64;
        for entry in work {
            if self.ctx.is_cancelled() {
                info!("Download worker cancelled");
                break;
            }

            match self.stage(&entry).await {
                Ok(staged) => {
                    self.ctx.record_download();
                    if handoff.send(staged).await.is_err() {
                        warn!("Load worker stopped receiving; ending downloads");
                        break;
                    }
                    handed_off += 1;
                }
                Err(e) => {
                    self.ctx.record_download_failure();
                    warn!(file = %entry.name, error = %e, "Download failed, skipping");
                }
            }
        }

        info!(handed_off, "Download worker finished");
        Ok(handed_off)
    }

    /// Fetch one file into the staging directory
    #[instrument(skip(self, entry), fields(file = %entry.name))]
    async fn stage(&self, entry: &CatalogEntry) -> Result<StagedFile> {
        let url = self.raw_base.join(&entry.name)?;
        let path = self.staging_dir.join(&entry.name);

        match self.fetch_to(&url, &path).await {
            Ok(bytes) => {
                debug!(bytes, path = %path.display(), "File staged");
                Ok(StagedFile {
                    name: entry.name.clone(),
                    path,
                })
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %remove_err, "Failed to remove partial file");
                    }
                }
                Err(e)
            }
        }
    }

    async fn fetch_to(&self, url: &Url, path: &Path) -> Result<u64> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::UnexpectedStatus {
                status,
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}
