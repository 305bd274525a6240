//! medbridge CLI Library
//!
//! Command-line front end for the ingestion and migration pipelines.
//!
//! # Overview
//!
//! - **Ingestion**: walk the remote catalog and load new bundles into the primary store (`medbridge ingest`)
//! - **Migration**: validate and bulk-copy the primary store into PostgreSQL (`medbridge migrate`)
//! - **Full pipeline**: ingestion followed by migration (`medbridge run`)
//! - **Status**: ledger size, entity counts and top labels of the primary store (`medbridge status`)
//!
//! Configuration comes from the environment (a `.env` file is loaded first);
//! flags given on the command line take precedence.

pub mod commands;
pub mod shutdown;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// medbridge - clinical bundle ingestion and migration
#[derive(Parser, Debug)]
#[command(name = "medbridge")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Primary store database file
    #[arg(long, env = "MEDBRIDGE_PRIMARY_DB", global = true)]
    pub primary_db: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest new bundles from the remote catalog into the primary store
    Ingest(IngestArgs),

    /// Migrate the primary store into the secondary PostgreSQL store
    Migrate(MigrateArgs),

    /// Ingest, then migrate
    Run {
        #[command(flatten)]
        ingest: IngestArgs,

        #[command(flatten)]
        migrate: MigrateArgs,
    },

    /// Show what the primary store currently holds
    Status(StatusArgs),
}

/// Overrides for the ingestion configuration
#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Paginated catalog listing URL
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// Base URL raw file contents are fetched from
    #[arg(long)]
    pub raw_base_url: Option<String>,

    /// Root directory for per-run staging directories
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

/// Overrides for the migration configuration
#[derive(Args, Debug, Clone, Default)]
pub struct MigrateArgs {
    /// Secondary store connection URL (postgres://...)
    #[arg(long)]
    pub pg_url: Option<String>,

    /// Secondary store schema
    #[arg(long)]
    pub schema: Option<String>,

    /// Concurrent table transfers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Labels kept per kind in the aggregate tables
    #[arg(long)]
    pub top_n: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Labels listed per kind
    #[arg(long, default_value_t = medbridge_migrate::config::DEFAULT_TOP_N)]
    pub top_n: u32,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn progress_enabled(&self) -> bool {
        !self.no_progress
    }
}
