//! Migration configuration
//!
//! Secondary store endpoint and namespace, plus the knobs of the bulk copy.
//! The schema name is validated here, once; nothing downstream re-checks it.

use medbridge_common::types::SchemaName;
use std::time::Duration;

use crate::error::{MigrateError, Result};

// ============================================================================
// Migration Constants
// ============================================================================

/// Logical namespace the secondary tables live in.
pub const DEFAULT_SCHEMA: &str = "test_medical";

/// Tables copied concurrently within one dependency wave.
pub const DEFAULT_MIGRATION_WORKERS: usize = 4;

/// Rows encoded per bulk-load chunk.
pub const DEFAULT_COPY_BATCH_ROWS: usize = 5000;

/// Labels kept per kind in the frequency aggregate.
pub const DEFAULT_TOP_N: u32 = 10;

/// Working memory granted to index rebuilds.
pub const DEFAULT_MAINTENANCE_WORK_MEM: &str = "256MB";

/// Secondary store connection settings
#[derive(Debug, Clone)]
pub struct SecondaryConfig {
    pub url: String,
    pub schema: SchemaName,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl SecondaryConfig {
    pub fn new(url: impl Into<String>, schema: SchemaName) -> Self {
        Self {
            url: url.into(),
            schema,
            max_connections: DEFAULT_MIGRATION_WORKERS as u32 + 2,
            connect_timeout_secs: 30,
        }
    }

    /// Load from `MEDBRIDGE_PG_URL`, or from `MEDBRIDGE_PG_HOST`,
    /// `MEDBRIDGE_PG_PORT`, `MEDBRIDGE_PG_USER`, `MEDBRIDGE_PG_PASSWORD` and
    /// `MEDBRIDGE_PG_DBNAME` when no URL is given
    pub fn from_env() -> Result<Self> {
        let url = match std::env::var("MEDBRIDGE_PG_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = std::env::var("MEDBRIDGE_PG_HOST").unwrap_or_else(|_| "localhost".into());
                let port: u16 = std::env::var("MEDBRIDGE_PG_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5432);
                let user = std::env::var("MEDBRIDGE_PG_USER").unwrap_or_else(|_| "postgres".into());
                let password = std::env::var("MEDBRIDGE_PG_PASSWORD").unwrap_or_default();
                let dbname =
                    std::env::var("MEDBRIDGE_PG_DBNAME").unwrap_or_else(|_| "medical".into());
                build_url(&host, port, &user, &password, &dbname)
            }
        };

        let schema = SchemaName::parse(
            &std::env::var("MEDBRIDGE_PG_SCHEMA").unwrap_or_else(|_| DEFAULT_SCHEMA.into()),
        )?;

        let mut config = Self::new(url, schema);
        if let Some(max) = std::env::var("MEDBRIDGE_PG_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.max_connections = max;
        }
        if let Some(secs) = std::env::var("MEDBRIDGE_PG_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.connect_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")) {
            return Err(MigrateError::config(
                "Secondary store URL must start with postgres:// or postgresql://",
            ));
        }
        if self.max_connections == 0 {
            return Err(MigrateError::config(
                "Secondary max_connections must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn build_url(host: &str, port: u16, user: &str, password: &str, dbname: &str) -> String {
    if password.is_empty() {
        format!("postgresql://{}@{}:{}/{}", user, host, port, dbname)
    } else {
        format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, dbname)
    }
}

/// Bulk copy and aggregate settings
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub workers: usize,
    pub batch_rows: usize,
    pub top_n: u32,
    pub maintenance_work_mem: String,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_MIGRATION_WORKERS,
            batch_rows: DEFAULT_COPY_BATCH_ROWS,
            top_n: DEFAULT_TOP_N,
            maintenance_work_mem: DEFAULT_MAINTENANCE_WORK_MEM.to_string(),
        }
    }
}

impl MigrateConfig {
    /// Load from `MEDBRIDGE_MIGRATION_WORKERS`, `MEDBRIDGE_COPY_BATCH_ROWS`,
    /// `MEDBRIDGE_TOP_N` and `MEDBRIDGE_MAINTENANCE_WORK_MEM`
    pub fn from_env() -> Result<Self> {
        let config = Self {
            workers: std::env::var("MEDBRIDGE_MIGRATION_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MIGRATION_WORKERS),
            batch_rows: std::env::var("MEDBRIDGE_COPY_BATCH_ROWS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_COPY_BATCH_ROWS),
            top_n: std::env::var("MEDBRIDGE_TOP_N")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TOP_N),
            maintenance_work_mem: std::env::var("MEDBRIDGE_MAINTENANCE_WORK_MEM")
                .unwrap_or_else(|_| DEFAULT_MAINTENANCE_WORK_MEM.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(MigrateError::config("Migration workers must be greater than 0"));
        }
        if self.batch_rows == 0 {
            return Err(MigrateError::config("Copy batch size must be greater than 0"));
        }
        if self.top_n == 0 {
            return Err(MigrateError::config("Top-N must be greater than 0"));
        }
        if !is_memory_setting(&self.maintenance_work_mem) {
            return Err(MigrateError::config(format!(
                "maintenance_work_mem must look like '256MB', got '{}'",
                self.maintenance_work_mem
            )));
        }
        Ok(())
    }
}

/// `SET` takes no bind parameters, so the value is restricted to `<digits><unit>`
fn is_memory_setting(value: &str) -> bool {
    let digits = value.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(&value[digits..], "kB" | "MB" | "GB")
}
