//! The primary store
//!
//! An embedded SQLite database holding `subjects`, `conditions`,
//! `medication_orders` and `ledger`. The ingestion phase writes it, the
//! migration phase and reporting read it.

mod primary;

pub use primary::{PrimaryConfig, PrimaryStore, TableCounts};

/// Default primary database file.
pub const DEFAULT_PRIMARY_DB_PATH: &str = "medicaldatabase.db";

/// Default maximum connections in the shared primary pool.
pub const DEFAULT_PRIMARY_MAX_CONNECTIONS: u32 = 4;

/// Default time a connection waits on a locked database, in seconds.
pub const DEFAULT_PRIMARY_BUSY_TIMEOUT_SECS: u64 = 30;
