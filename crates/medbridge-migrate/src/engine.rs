//! Migration engine
//!
//! Drives one migration run through [`MigrationState`]: guard, validate,
//! disable indexes, bulk copy, rebuild indexes, refresh aggregates.

use medbridge_common::store::{PrimaryStore, TableCounts};
use medbridge_common::Table;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregates::{refresh_aggregates, AggregateSummary};
use crate::config::MigrateConfig;
use crate::copy::{copy_all, CopySummary};
use crate::db::SecondaryStore;
use crate::error::{MigrateError, Result};
use crate::indexes::{disable_indexes, rebuild_indexes};
use crate::state::MigrationState;
use crate::validate::validate_primary;

/// Summary of a run that got past validation
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub plan: TableCounts,
    pub copy: CopySummary,
    pub indexes_rebuilt: usize,
    pub aggregates: Option<AggregateSummary>,
    pub elapsed: Duration,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Serialize)]
pub enum MigrationOutcome {
    /// Secondary store already held every table; nothing was done
    AlreadyMigrated,
    Completed(MigrationReport),
    /// Stopped on request; committed tables stay, aggregates were not refreshed
    Cancelled(MigrationReport),
}

pub struct MigrationEngine {
    primary: PrimaryStore,
    secondary: SecondaryStore,
    config: MigrateConfig,
    cancel: CancellationToken,
    state: MigrationState,
}

impl MigrationEngine {
    pub fn new(
        primary: PrimaryStore,
        secondary: SecondaryStore,
        config: MigrateConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
            cancel,
            state: MigrationState::Idle,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Run the migration once
    ///
    /// Integrity violations fail with [`MigrateError::Integrity`] before the
    /// secondary store is written. A copy failure names its table. Indexes
    /// that were dropped are rebuilt whatever the copy outcome.
    pub async fn run(&mut self) -> Result<MigrationOutcome> {
        let started = Instant::now();

        self.secondary.health_check().await?;

        if self.secondary.is_fully_migrated().await? {
            info!(schema = %self.secondary.schema(), "Secondary store already migrated, skipping");
            self.state.advance(MigrationState::Done)?;
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        self.state.advance(MigrationState::Validating)?;
        let report = match validate_primary(self.primary.pool()).await {
            Ok(report) => report,
            Err(e) => return Err(self.abort(e)),
        };
        if !report.is_clean() {
            self.state.advance(MigrationState::Rejected)?;
            return Err(MigrateError::Integrity(report));
        }
        self.state.advance(MigrationState::Validated)?;

        let plan = self.log_plan().await?;

        if self.cancel.is_cancelled() {
            return self.cancelled(plan, CopySummary::default(), 0, started);
        }

        if let Err(e) = self.secondary.ensure_schema().await {
            return Err(self.abort(e));
        }

        let definitions = match disable_indexes(&self.secondary).await {
            Ok(definitions) => definitions,
            Err(e) => return Err(self.abort(e)),
        };
        self.state.advance(MigrationState::IndexesDisabled)?;

        self.state.advance(MigrationState::BulkCopying)?;
        let copied = copy_all(&self.primary, &self.secondary, &self.config, &self.cancel).await;

        let rebuilt = rebuild_indexes(
            &self.secondary,
            &definitions,
            &self.config.maintenance_work_mem,
        )
        .await;

        let copy = match copied {
            Ok(copy) => copy,
            Err(e) => {
                if let Err(rebuild_err) = rebuilt {
                    error!(error = %rebuild_err, "Index rebuild after failed copy also failed");
                }
                return Err(self.abort(e));
            }
        };
        let indexes_rebuilt = match rebuilt {
            Ok(n) => n,
            Err(e) => return Err(self.abort(e)),
        };
        self.state.advance(MigrationState::IndexesRebuilt)?;

        if copy.cancelled {
            return self.cancelled(plan, copy, indexes_rebuilt, started);
        }

        let aggregates =
            match refresh_aggregates(&self.primary, &self.secondary, self.config.top_n).await {
                Ok(aggregates) => aggregates,
                Err(e) => return Err(self.abort(e)),
            };
        self.state.advance(MigrationState::AggregatesRefreshed)?;
        self.state.advance(MigrationState::Done)?;

        let report = MigrationReport {
            plan,
            copy,
            indexes_rebuilt,
            aggregates: Some(aggregates),
            elapsed: started.elapsed(),
        };
        info!(
            rows = report.copy.rows(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Migration finished"
        );
        Ok(MigrationOutcome::Completed(report))
    }

    async fn log_plan(&self) -> Result<TableCounts> {
        let counts = self.primary.table_counts().await?;
        for table in Table::ALL {
            info!(table = %table, rows = counts.get(table), "Planned table copy");
        }
        info!(total_rows = counts.total(), workers = self.config.workers, "Migration plan");
        Ok(counts)
    }

    fn cancelled(
        &mut self,
        plan: TableCounts,
        copy: CopySummary,
        indexes_rebuilt: usize,
        started: Instant,
    ) -> Result<MigrationOutcome> {
        warn!(state = %self.state, "Migration cancelled");
        self.state.advance(MigrationState::Aborted)?;
        Ok(MigrationOutcome::Cancelled(MigrationReport {
            plan,
            copy,
            indexes_rebuilt,
            aggregates: None,
            elapsed: started.elapsed(),
        }))
    }

    fn abort(&mut self, e: MigrateError) -> MigrateError {
        match e.failed_table() {
            Some(table) => error!(state = %self.state, table = %table, error = %e, "Migration aborted"),
            None => error!(state = %self.state, error = %e, "Migration aborted"),
        }
        if let Err(transition) = self.state.advance(MigrationState::Aborted) {
            warn!(error = %transition, "Abort from a terminal state");
        }
        e
    }
}
