use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::ConnectOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    DEFAULT_PRIMARY_BUSY_TIMEOUT_SECS, DEFAULT_PRIMARY_DB_PATH, DEFAULT_PRIMARY_MAX_CONNECTIONS,
};
use crate::error::{MedbridgeError, Result};
use crate::types::{DemographicCount, LabelCount, ResourceKind, Table};

/// Primary store configuration
#[derive(Debug, Clone)]
pub struct PrimaryConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PRIMARY_DB_PATH),
            max_connections: DEFAULT_PRIMARY_MAX_CONNECTIONS,
            busy_timeout_secs: DEFAULT_PRIMARY_BUSY_TIMEOUT_SECS,
        }
    }
}

impl PrimaryConfig {
    /// Configuration for a database file at `path`, defaults elsewhere
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Load from `MEDBRIDGE_PRIMARY_DB`, `MEDBRIDGE_PRIMARY_MAX_CONNECTIONS`
    /// and `MEDBRIDGE_PRIMARY_BUSY_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let config = Self {
            path: std::env::var("MEDBRIDGE_PRIMARY_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PRIMARY_DB_PATH)),
            max_connections: std::env::var("MEDBRIDGE_PRIMARY_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PRIMARY_MAX_CONNECTIONS),
            busy_timeout_secs: std::env::var("MEDBRIDGE_PRIMARY_BUSY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PRIMARY_BUSY_TIMEOUT_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(MedbridgeError::config("Primary database path cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(MedbridgeError::config(
                "Primary max_connections must be greater than 0",
            ));
        }
        Ok(())
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

/// Row counts of the primary tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub subjects: i64,
    pub conditions: i64,
    pub medication_orders: i64,
    pub ledger: i64,
}

impl TableCounts {
    pub fn get(&self, table: Table) -> i64 {
        match table {
            Table::Subjects => self.subjects,
            Table::Conditions => self.conditions,
            Table::MedicationOrders => self.medication_orders,
            Table::Ledger => self.ledger,
        }
    }

    pub fn total(&self) -> i64 {
        Table::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

/// Handle to the embedded primary store
#[derive(Clone)]
pub struct PrimaryStore {
    pool: SqlitePool,
    options: SqliteConnectOptions,
    path: PathBuf,
}

impl PrimaryStore {
    /// Open (creating if needed) the database and bring its schema up to date
    pub async fn open(config: &PrimaryConfig) -> Result<Self> {
        config.validate()?;
        let options = config.connect_options();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options.clone())
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(
            path = %config.path.display(),
            max_connections = config.max_connections,
            "Primary store ready"
        );

        Ok(Self {
            pool,
            options,
            path: config.path.clone(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A dedicated connection outside the pool, owned by one worker loop
    pub async fn connect_private(&self) -> Result<SqliteConnection> {
        Ok(self.options.connect().await?)
    }

    pub async fn count(&self, table: Table) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn table_counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            subjects: self.count(Table::Subjects).await?,
            conditions: self.count(Table::Conditions).await?,
            medication_orders: self.count(Table::MedicationOrders).await?,
            ledger: self.count(Table::Ledger).await?,
        })
    }

    /// Most frequent labels of a kind; ties break alphabetically so repeated
    /// calls over the same data return the same rows
    pub async fn top_labels(&self, kind: ResourceKind, limit: u32) -> Result<Vec<LabelCount>> {
        let table = Table::for_label_kind(kind).ok_or_else(|| {
            MedbridgeError::config(format!("{:?} resources carry no label", kind))
        })?;

        let sql = format!(
            r#"
            SELECT label, COUNT(*) AS count
            FROM {}
            GROUP BY label
            ORDER BY count DESC, label ASC
            LIMIT ?1
            "#,
            table.name()
        );

        let rows = sqlx::query_as::<_, LabelCount>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn demographic_counts(&self) -> Result<Vec<DemographicCount>> {
        let rows = sqlx::query_as::<_, DemographicCount>(
            r#"
            SELECT demographic AS category, COUNT(*) AS count
            FROM subjects
            GROUP BY demographic
            ORDER BY count DESC, category ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn open_temp() -> (tempfile::TempDir, PrimaryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PrimaryStore::open(&PrimaryConfig::at(dir.path().join("primary.db")))
            .await
            .unwrap();
        (dir, store)
    }

    async fn insert_subject(store: &PrimaryStore, id: &str, demographic: &str) {
        sqlx::query("INSERT INTO subjects (subject_id, demographic, ingested_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(demographic)
            .bind(Utc::now())
            .execute(store.pool())
            .await
            .unwrap();
    }

    async fn insert_condition(store: &PrimaryStore, id: &str, label: &str) {
        sqlx::query("INSERT INTO conditions (subject_id, label, ingested_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(label)
            .bind(Utc::now())
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_empty_schema() {
        let (_dir, store) = open_temp().await;
        assert_eq!(store.table_counts().await.unwrap(), TableCounts::default());
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = PrimaryConfig::at(dir.path().join("primary.db"));
        let first = PrimaryStore::open(&config).await.unwrap();
        insert_subject(&first, "P1", "female").await;
        first.close().await;

        let second = PrimaryStore::open(&config).await.unwrap();
        assert_eq!(second.count(Table::Subjects).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let (_dir, store) = open_temp().await;
        let result = sqlx::query(
            "INSERT INTO conditions (subject_id, label, ingested_at) VALUES ('ghost', 'x', '2024-01-01')",
        )
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_top_labels_orders_by_count_then_label() {
        let (_dir, store) = open_temp().await;
        insert_subject(&store, "P1", "female").await;
        for label in ["Asthma", "Hypertension", "Hypertension", "Diabetes", "Asthma", "Hypertension"] {
            insert_condition(&store, "P1", label).await;
        }

        let top = store.top_labels(ResourceKind::Condition, 2).await.unwrap();
        assert_eq!(
            top,
            vec![
                LabelCount { label: "Hypertension".into(), count: 3 },
                LabelCount { label: "Asthma".into(), count: 2 },
            ]
        );
        assert!(store.top_labels(ResourceKind::Subject, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_demographic_counts() {
        let (_dir, store) = open_temp().await;
        insert_subject(&store, "P1", "female").await;
        insert_subject(&store, "P2", "male").await;
        insert_subject(&store, "P3", "female").await;

        let counts = store.demographic_counts().await.unwrap();
        assert_eq!(counts[0], DemographicCount { category: "female".into(), count: 2 });
        assert_eq!(counts[1], DemographicCount { category: "male".into(), count: 1 });
    }
}
