//! Parse & load worker
//!
//! Consumes staged files from the handoff channel and writes each file's
//! entities together with its ledger entry in one transaction on a
//! connection owned by this worker.

use chrono::{DateTime, Utc};
use medbridge_common::checksum::sha256_bytes;
use medbridge_common::RunContext;
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::bundle::{parse_bundle, BundleContent, ParsedBundle};
use crate::download::StagedFile;
use crate::error::Result;
use crate::ledger;

/// What happened to one staged file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Entities and ledger entry committed
    Loaded { labels: usize },
    /// Already in the ledger when dequeued
    AlreadyProcessed,
    /// No subject entry; left out of the ledger
    NoSubject,
}

/// Consumer side of the handoff channel
pub struct LoadWorker {
    conn: SqliteConnection,
    ctx: Arc<RunContext>,
}

impl LoadWorker {
    pub fn new(conn: SqliteConnection, ctx: Arc<RunContext>) -> Self {
        Self { conn, ctx }
    }

    /// Drain the channel until every sender is dropped
    ///
    /// Per-file failures are counted and logged; they never end the loop.
    pub async fn run(mut self, mut handoff: mpsc::Receiver<StagedFile>) -> Result<()> {
        info!("Load worker started");

        while let Some(staged) = handoff.recv().await {
            match self.load_file(&staged).await {
                Ok(LoadOutcome::Loaded { .. }) => self.ctx.record_processed(),
                Ok(LoadOutcome::AlreadyProcessed) | Ok(LoadOutcome::NoSubject) => {
                    self.ctx.record_skipped()
                }
                Err(e) => {
                    self.ctx.record_error();
                    warn!(file = %staged.name, error = %e, "Failed to load file; it stays eligible for retry");
                }
            }
        }

        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "Failed to close load worker connection");
        }
        info!("Load worker finished");
        Ok(())
    }

    /// Parse one staged file and apply it atomically
    #[instrument(skip(self, staged), fields(file = %staged.name))]
    pub async fn load_file(&mut self, staged: &StagedFile) -> Result<LoadOutcome> {
        if ledger::is_processed(&mut self.conn, &staged.name).await? {
            debug!("Already in ledger, discarding");
            return Ok(LoadOutcome::AlreadyProcessed);
        }

        let bytes = tokio::fs::read(&staged.path).await?;
        let bundle = match parse_bundle(&staged.name, &bytes)? {
            BundleContent::Parsed(bundle) => bundle,
            BundleContent::NoSubject => {
                warn!("No subject entry; file not recorded and will be retried");
                return Ok(LoadOutcome::NoSubject);
            }
        };
        let checksum = sha256_bytes(&bytes);

        let outcome = self
            .apply(&staged.name, &bundle, &checksum, Utc::now())
            .await?;
        if let LoadOutcome::Loaded { labels } = outcome {
            debug!(subject = %bundle.subject_id, labels, "File loaded");
        }
        Ok(outcome)
    }

    /// Ledger write and entity inserts as one unit; dropping the transaction
    /// on any error rolls all of it back
    ///
    /// The ledger row is claimed first. If another writer already recorded
    /// the file, nothing of this file is written.
    async fn apply(
        &mut self,
        file_name: &str,
        bundle: &ParsedBundle,
        checksum: &str,
        now: DateTime<Utc>,
    ) -> Result<LoadOutcome> {
        let mut tx = self.conn.begin().await?;

        if !ledger::mark_processed(&mut *tx, file_name, Some(checksum), now).await? {
            tx.rollback().await?;
            debug!("Ledger entry written by another loader, discarding");
            return Ok(LoadOutcome::AlreadyProcessed);
        }

        sqlx::query(
            r#"
            INSERT INTO subjects (subject_id, demographic, ingested_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (subject_id) DO NOTHING
            "#,
        )
        .bind(&bundle.subject_id)
        .bind(&bundle.demographic)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for label in &bundle.conditions {
            sqlx::query("INSERT INTO conditions (subject_id, label, ingested_at) VALUES (?1, ?2, ?3)")
                .bind(&bundle.subject_id)
                .bind(label)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        for label in &bundle.medication_orders {
            sqlx::query(
                "INSERT INTO medication_orders (subject_id, label, ingested_at) VALUES (?1, ?2, ?3)",
            )
            .bind(&bundle.subject_id)
            .bind(label)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(LoadOutcome::Loaded {
            labels: bundle.label_count(),
        })
    }
}
