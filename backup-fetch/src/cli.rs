//!
//! This module implements the CLI interface for backup-fetch: command parsing,
//! config loading, client construction and the hand-off to the core fetcher.
//!
//! All business logic (listing, filtering, downloading) lives in the
//! [`backup-fetch-core`] crate. This module is strictly CLI glue.
//!
//! ## How To Use
//! - From the command line: `backup-fetch fetch --config backup.yaml`.
//! - Programmatically: call [`run`] with a constructed [`Cli`], or
//!   [`run_with_dispatch`] to choose where the log events go.
//!
//! [`backup-fetch-core`]: ../../backup_fetch_core/

use crate::load_config::load_config;
use crate::logging::{build_dispatch, DEFAULT_LOG_FILE};
use crate::s3::S3ObjectStore;
use anyhow::{Context, Result};
use backup_fetch_core::fetch::{BackupFetcher, RunReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

/// CLI for backup-fetch: copy recent backups out of an S3-compatible bucket.
#[derive(Parser)]
#[clap(
    name = "backup-fetch",
    version,
    about = "Download recently modified backups matching a pattern from an S3-compatible bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find recent backups under the configured prefix and download them
    Fetch {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override the prefix from the config file
        #[clap(long)]
        prefix: Option<String>,
        /// Override the destination directory from the config file
        #[clap(long)]
        destination: Option<PathBuf>,
        /// File the log lines are appended to, in addition to stdout
        #[clap(long, default_value = DEFAULT_LOG_FILE)]
        log_file: PathBuf,
    },
}

/// Entrypoint for main(): sets up the log sinks, then runs the command.
pub async fn run(cli: Cli) -> Result<RunReport> {
    let log_file = match &cli.command {
        Commands::Fetch { log_file, .. } => log_file.clone(),
    };
    let dispatch = build_dispatch(&log_file)?;
    run_with_dispatch(cli, dispatch).await
}

/// Run the command, reporting every event through `dispatch`.
pub async fn run_with_dispatch(cli: Cli, dispatch: Dispatch) -> Result<RunReport> {
    let fetcher_dispatch = dispatch.clone();
    async move {
        tracing::info!("CLI run started");

        let result = match cli.command {
            Commands::Fetch {
                config,
                prefix,
                destination,
                ..
            } => fetch(config, prefix, destination, fetcher_dispatch).await,
        };

        match &result {
            Ok(report) if report.is_success() => {
                tracing::info!(command = "fetch", summary = %report.summary(), "Fetch complete")
            }
            Ok(report) => tracing::error!(
                command = "fetch",
                summary = %report.summary(),
                listing_failed = report.listing_failed,
                "Fetch downloaded nothing"
            ),
            Err(e) => tracing::error!(command = "fetch", error = %e, "Fatal error"),
        }
        result
    }
    .with_subscriber(dispatch)
    .await
}

async fn fetch(
    config_path: PathBuf,
    prefix: Option<String>,
    destination: Option<PathBuf>,
    dispatch: Dispatch,
) -> Result<RunReport> {
    let mut config = load_config(config_path)?;
    if let Some(destination) = destination {
        config.fetch.destination = destination;
    }
    let prefix = prefix.unwrap_or_else(|| config.fetch.prefix.clone());
    config.connection.trace_loaded();
    config.fetch.trace_loaded();

    let store = S3ObjectStore::connect(&config.connection).await?;
    let fetcher = BackupFetcher::new(store, config.fetch, dispatch)
        .context("Failed to set up backup fetcher")?;
    Ok(fetcher.run(&prefix).await)
}
