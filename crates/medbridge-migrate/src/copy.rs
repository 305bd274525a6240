//! Parallel bulk copy from the primary to the secondary store
//!
//! Each table is streamed out of its own SQLite connection and written with
//! `COPY ... FROM STDIN` inside its own Postgres transaction, so a failed
//! table never leaves partial rows and never touches a table that already
//! committed. Tables are grouped in waves so that referenced rows land before
//! the rows that reference them.

use futures::{stream, StreamExt, TryStreamExt};
use medbridge_common::store::PrimaryStore;
use medbridge_common::types::strip_line_breaks;
use medbridge_common::Table;
use serde::Serialize;
use sqlx::postgres::{PgConnection, PgCopyIn};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, Row};
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::MigrateConfig;
use crate::db::SecondaryStore;
use crate::error::{CopyCause, MigrateError, Result};

/// Copy order: every table of a wave commits before the next wave starts
pub const COPY_WAVES: [&[Table]; 2] = [
    &[Table::Subjects, Table::Ledger],
    &[Table::Conditions, Table::MedicationOrders],
];

/// Outcome of one table transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCopyStats {
    pub table: Table,
    pub rows: u64,
    /// Secondary copy was already populated by an earlier run
    pub skipped: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CopySummary {
    pub tables: Vec<TableCopyStats>,
    pub cancelled: bool,
}

impl CopySummary {
    pub fn rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Copy every table, wave by wave, with at most `config.workers` transfers in flight
///
/// Cancellation is checked before each table starts; a running transfer
/// always finishes (commit or rollback) first.
pub async fn copy_all(
    primary: &PrimaryStore,
    secondary: &SecondaryStore,
    config: &MigrateConfig,
    cancel: &CancellationToken,
) -> Result<CopySummary> {
    let mut summary = CopySummary::default();

    for wave in COPY_WAVES {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let results: Vec<Result<Option<TableCopyStats>>> = stream::iter(wave.iter().copied())
            .map(|table| async move {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                copy_table(primary, secondary, table, config.batch_rows)
                    .await
                    .map(Some)
            })
            .buffer_unordered(config.workers)
            .collect()
            .await;

        let mut failure = None;
        for result in results {
            match result {
                Ok(Some(stats)) => summary.tables.push(stats),
                Ok(None) => summary.cancelled = true,
                Err(e) => {
                    error!(error = %e, "Table transfer failed");
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
    }

    if summary.cancelled {
        warn!(copied_tables = summary.tables.len(), "Bulk copy cancelled");
    } else {
        info!(rows = summary.rows(), tables = summary.tables.len(), "Bulk copy finished");
    }
    Ok(summary)
}

/// Transfer one table; a populated secondary table is left as is
#[instrument(skip_all, fields(table = %table))]
pub async fn copy_table(
    primary: &PrimaryStore,
    secondary: &SecondaryStore,
    table: Table,
    batch_rows: usize,
) -> Result<TableCopyStats> {
    let started = Instant::now();

    if !secondary.is_empty(table).await? {
        info!("Secondary table already populated, skipping");
        return Ok(TableCopyStats {
            table,
            rows: 0,
            skipped: true,
            elapsed: started.elapsed(),
        });
    }

    let rows = transfer(primary, secondary, table, batch_rows)
        .await
        .map_err(|source| MigrateError::table_copy(table, source))?;

    let elapsed = started.elapsed();
    info!(rows, elapsed_ms = elapsed.as_millis() as u64, "Table copied");
    Ok(TableCopyStats {
        table,
        rows,
        skipped: false,
        elapsed,
    })
}

async fn transfer(
    primary: &PrimaryStore,
    secondary: &SecondaryStore,
    table: Table,
    batch_rows: usize,
) -> std::result::Result<u64, CopyCause> {
    let mut reader = primary.connect_private().await?;
    let mut tx = secondary.pool().begin().await?;

    sqlx::query("SET LOCAL synchronous_commit = off")
        .execute(&mut *tx)
        .await?;

    let columns = table.columns().join(", ");
    let statement = format!("COPY {} ({}) FROM STDIN WITH (FORMAT csv)", table.name(), columns);
    let mut copy = tx.copy_in_raw(&statement).await?;

    let copied = match stream_rows(&mut reader, table, batch_rows, &mut copy).await {
        Ok(sent) => {
            let copied = copy.finish().await?;
            debug!(sent, copied, "COPY finished");
            copied
        }
        Err(e) => {
            if let Err(abort_err) = copy.abort(e.to_string()).await {
                debug!(error = %abort_err, "COPY abort reported an error");
            }
            return Err(e);
        }
    };

    tx.commit().await?;
    reader.close().await?;
    Ok(copied)
}

/// Stream primary rows into the open COPY in `batch_rows` chunks
async fn stream_rows(
    reader: &mut SqliteConnection,
    table: Table,
    batch_rows: usize,
    copy: &mut PgCopyIn<&mut PgConnection>,
) -> std::result::Result<u64, CopyCause> {
    let select = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        table.columns().join(", "),
        table.name()
    );
    let width = table.columns().len();

    let mut rows = sqlx::query(&select).fetch(&mut *reader);
    let mut batch = CsvBatch::new(batch_rows);
    let mut sent = 0u64;

    while let Some(row) = rows.try_next().await? {
        let mut fields: Vec<Option<String>> = Vec::with_capacity(width);
        for i in 0..width {
            fields.push(row.try_get(i)?);
        }
        batch.push(&fields)?;

        if batch.is_full() {
            sent += batch.len() as u64;
            copy.send(batch.take()?).await?;
        }
    }

    if !batch.is_empty() {
        sent += batch.len() as u64;
        copy.send(batch.take()?).await?;
    }
    Ok(sent)
}

/// CSV rows for one `COPY` chunk
///
/// NULL is an unquoted empty field. Line breaks inside values become spaces.
pub(crate) struct CsvBatch {
    writer: csv::Writer<Vec<u8>>,
    rows: usize,
    capacity: usize,
}

impl CsvBatch {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            writer: Self::writer(),
            rows: 0,
            capacity: capacity.max(1),
        }
    }

    fn writer() -> csv::Writer<Vec<u8>> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new())
    }

    pub(crate) fn push(&mut self, fields: &[Option<String>]) -> csv::Result<()> {
        let values: Vec<Cow<'_, str>> = fields
            .iter()
            .map(|field| match field {
                Some(value) => strip_line_breaks(value),
                None => Cow::Borrowed(""),
            })
            .collect();
        self.writer.write_record(values.iter().map(|v| v.as_bytes()))?;
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.rows
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.rows >= self.capacity
    }

    /// Encoded bytes of the current chunk; the batch starts over empty
    pub(crate) fn take(&mut self) -> std::io::Result<Vec<u8>> {
        let writer = std::mem::replace(&mut self.writer, Self::writer());
        self.rows = 0;
        writer.into_inner().map_err(|e| e.into_error())
    }
}
