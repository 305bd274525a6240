//! medbridge CLI - Main entry point

use anyhow::Result;
use clap::Parser;
use medbridge_cli::shutdown::spawn_cancellation_monitor;
use medbridge_cli::{commands, Cli, Commands};
use medbridge_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment alone is enough
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("medbridge")
        .build();

    // The CLI works without logging, so a bad logging setup only warns
    let guard = match log_config.merge_env().and_then(|config| init_logging(&config)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        }
    };

    let cancel = CancellationToken::new();
    let monitor = spawn_cancellation_monitor(cancel.clone());

    let result = execute_command(&cli, cancel).await;
    monitor.abort();

    if let Err(e) = result {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        drop(guard);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, cancel: CancellationToken) -> Result<()> {
    match &cli.command {
        Commands::Ingest(args) => commands::ingest::run(cli, args, cancel).await.map(|_| ()),
        Commands::Migrate(args) => commands::migrate::run(cli, args, cancel).await.map(|_| ()),
        Commands::Run { ingest, migrate } => {
            commands::run::run(cli, ingest, migrate, cancel).await
        }
        Commands::Status(args) => commands::status::run(cli, args).await,
    }
}
