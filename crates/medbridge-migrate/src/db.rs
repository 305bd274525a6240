//! Secondary store connection and schema management

use medbridge_common::types::SchemaName;
use medbridge_common::Table;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;

use crate::config::SecondaryConfig;
use crate::error::{MigrateError, Result};
use crate::indexes::missing_indexes;

/// Handle to the server-grade secondary store
///
/// Every pooled connection starts with `search_path` set to the configured
/// schema, so queries use bare table names.
#[derive(Clone)]
pub struct SecondaryStore {
    pool: PgPool,
    schema: SchemaName,
}

impl SecondaryStore {
    pub async fn connect(config: &SecondaryConfig) -> Result<Self> {
        config.validate()?;

        let options = PgConnectOptions::from_str(&config.url)
            .map_err(MigrateError::Connection)?
            .options([("search_path", config.schema.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(MigrateError::Connection)?;

        tracing::info!(
            schema = %config.schema,
            max_connections = config.max_connections,
            "Secondary store connection pool created"
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(MigrateError::Connection)
    }

    /// Create the schema and apply pending secondary migrations
    pub async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema.quoted());
        sqlx::query(&ddl).execute(&self.pool).await?;
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!(schema = %self.schema, "Secondary schema ready");
        Ok(())
    }

    pub async fn schema_exists(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(self.schema.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Which of the copied tables exist in the schema
    pub async fn existing_tables(&self) -> Result<Vec<Table>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
            "#,
        )
        .bind(self.schema.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(Table::ALL
            .into_iter()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .collect())
    }

    pub async fn is_empty(&self, table: Table) -> Result<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} LIMIT 1)", table.name());
        let has_rows: bool = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(!has_rows)
    }

    pub async fn row_count(&self, table: Table) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    /// Schema present, every copied table present and non-empty, every
    /// secondary index in place
    pub async fn is_fully_migrated(&self) -> Result<bool> {
        if !self.schema_exists().await? {
            return Ok(false);
        }
        if self.existing_tables().await?.len() != Table::ALL.len() {
            return Ok(false);
        }
        for table in Table::ALL {
            if self.is_empty(table).await? {
                return Ok(false);
            }
        }
        let missing = missing_indexes(self).await?;
        if !missing.is_empty() {
            tracing::warn!(?missing, "Secondary indexes missing, migration will restore them");
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
