//! medbridge Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the medbridge workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all medbridge workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized `tracing` setup
//! - **Checksums**: Content fingerprints for staged bundle files
//! - **Types**: Domain entities, resource kinds, the table allow-list and text sanitization
//! - **Context**: Run-scoped progress counters and cancellation
//! - **Store**: The embedded primary store (schema, connections, read-only summaries)
//!
//! # Example
//!
//! ```no_run
//! use medbridge_common::store::{PrimaryConfig, PrimaryStore};
//!
//! # async fn run() -> medbridge_common::Result<()> {
//! let store = PrimaryStore::open(&PrimaryConfig::default()).await?;
//! let counts = store.table_counts().await?;
//! println!("subjects: {}", counts.subjects);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod context;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use context::{ProgressSnapshot, RunContext};
pub use error::{MedbridgeError, Result};
pub use types::{ResourceKind, Table};
