//! Error types for the migration phase

use medbridge_common::{MedbridgeError, Table};
use thiserror::Error;

use crate::state::MigrationState;
use crate::validate::IntegrityReport;

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Boxed cause of a per-table copy failure
pub type CopyCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while validating, copying or summarizing
#[derive(Error, Debug)]
pub enum MigrateError {
    /// The secondary store could not be reached at all
    #[error("Cannot connect to the secondary store: {0}. Check MEDBRIDGE_PG_URL and that the server is running.")]
    Connection(#[source] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Secondary schema migration failed: {0}")]
    Schema(#[from] sqlx::migrate::MigrateError),

    /// The primary store holds rows that would break referential integrity
    #[error("Primary store failed integrity validation: {0}")]
    Integrity(IntegrityReport),

    #[error("Failed to copy table {table}: {source}")]
    TableCopy {
        table: Table,
        #[source]
        source: CopyCause,
    },

    #[error("Index maintenance failed for {index}: {source}")]
    Index {
        index: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid migration state transition from {from} to {to}")]
    InvalidTransition {
        from: MigrationState,
        to: MigrationState,
    },

    #[error(transparent)]
    Common(#[from] MedbridgeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrateError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap any failure while copying `table`
    pub fn table_copy(table: Table, source: impl Into<CopyCause>) -> Self {
        Self::TableCopy {
            table,
            source: source.into(),
        }
    }

    /// Table whose transfer failed, if this is a per-table failure
    pub fn failed_table(&self) -> Option<Table> {
        match self {
            Self::TableCopy { table, .. } => Some(*table),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_copy_names_the_table() {
        let err = MigrateError::table_copy(Table::Conditions, "connection reset");
        assert_eq!(err.failed_table(), Some(Table::Conditions));
        assert_eq!(err.to_string(), "Failed to copy table conditions: connection reset");

        assert_eq!(MigrateError::config("bad").failed_table(), None);
    }
}
