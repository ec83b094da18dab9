//! Log sink setup: every line goes to stdout and to an append-only log file.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, Registry};

pub const DEFAULT_LOG_FILE: &str = "s3_download.log";

/// Build the dispatch the CLI and the fetcher report through.
///
/// Timestamped, human-readable lines at INFO and above; the file copy has no ANSI colours.
pub fn build_dispatch(log_file: &Path) -> Result<Dispatch> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let stdout_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    let subscriber = Registry::default()
        .with(LevelFilter::INFO)
        .with(stdout_layer)
        .with(file_layer);
    Ok(Dispatch::new(subscriber))
}
