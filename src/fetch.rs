//! Top-level pipeline: list a bucket, pick the recent backups, copy them locally.
//!
//! [`BackupFetcher`] owns a storage client (any [`ObjectStore`]), the
//! [`FetchConfig`] and the tracing [`Dispatch`] it reports through. Every
//! event it emits goes to that dispatch, so callers decide where the log
//! lines end up without touching process-wide logging state.
//!
//! # Flow
//! `run(prefix)`: banner → [`BackupFetcher::find_recent_backups`] → one
//! [`BackupFetcher::download_file`] per candidate, in listing order → tally.
//!
//! # Error Handling
//! - A listing failure is logged and treated as "no backups found".
//! - A failed download is logged and skipped; the next candidate is still tried.
//! - The run succeeds when at least one file was downloaded.

use std::fmt;

use chrono::Utc;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn, Dispatch};

use crate::config::FetchConfig;
use crate::contract::{ObjectStore, StoreError};
use crate::download::{download_object, DownloadError, DownloadedBackup};
use crate::filter::{select_candidates, BackupCandidate, KeyPattern, RecencyWindow};

#[derive(Debug)]
pub enum FetcherError {
    Io(std::io::Error),
    Pattern(regex::Error),
}

impl fmt::Display for FetcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetcherError::Io(e) => write!(f, "cannot prepare destination directory: {e}"),
            FetcherError::Pattern(e) => write!(f, "invalid key pattern: {e}"),
        }
    }
}

impl std::error::Error for FetcherError {}

impl From<std::io::Error> for FetcherError {
    fn from(e: std::io::Error) -> Self {
        FetcherError::Io(e)
    }
}

impl From<regex::Error> for FetcherError {
    fn from(e: regex::Error) -> Self {
        FetcherError::Pattern(e)
    }
}

/// Outcome of a single run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Number of candidates that passed both filters.
    pub found: usize,
    pub downloaded: Vec<DownloadedBackup>,
    /// Keys whose download failed, in the order they were attempted.
    pub failed: Vec<String>,
    /// Listing itself failed; `found` is then zero.
    pub listing_failed: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.downloaded.len()
    }

    /// At least one backup landed on disk.
    pub fn is_success(&self) -> bool {
        self.succeeded() > 0
    }

    /// `succeeded/found`, e.g. `2/3`.
    pub fn summary(&self) -> String {
        format!("{}/{}", self.succeeded(), self.found)
    }
}

pub struct BackupFetcher<S> {
    store: S,
    config: FetchConfig,
    pattern: KeyPattern,
    window: RecencyWindow,
    dispatch: Dispatch,
}

impl<S> BackupFetcher<S>
where
    S: ObjectStore,
{
    /// Compile the key pattern and create the destination directory (with parents).
    pub fn new(store: S, config: FetchConfig, dispatch: Dispatch) -> Result<Self, FetcherError> {
        let pattern = KeyPattern::new(&config.pattern)?;
        let window = RecencyWindow::from_hours(config.max_age_hours);
        std::fs::create_dir_all(&config.destination)?;

        tracing::dispatcher::with_default(&dispatch, || {
            info!(
                bucket = %config.bucket,
                destination = %config.destination.display(),
                pattern = %pattern.as_str(),
                max_age_hours = config.max_age_hours,
                "Backup fetcher ready"
            );
        });

        Ok(Self {
            store,
            config,
            pattern,
            window,
            dispatch,
        })
    }

    /// List `prefix` recursively and keep the keys that match the pattern and are recent.
    ///
    /// A listing failure is logged and yields an empty list.
    pub async fn find_recent_backups(&self, prefix: &str) -> Vec<BackupCandidate> {
        self.list_candidates(prefix)
            .with_subscriber(self.dispatch.clone())
            .await
            .unwrap_or_default()
    }

    /// Download a single object into the destination directory.
    pub async fn download_file(&self, object_name: &str) -> Result<DownloadedBackup, DownloadError> {
        self.download_one(object_name)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    /// Run the full search-and-download process for `prefix`.
    pub async fn run(&self, prefix: &str) -> RunReport {
        self.run_inner(prefix)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn list_candidates(&self, prefix: &str) -> Result<Vec<BackupCandidate>, StoreError> {
        let listed = match self.store.list_objects(&self.config.bucket, prefix).await {
            Ok(listed) => listed,
            Err(e) => {
                error!(
                    error = %e,
                    bucket = %self.config.bucket,
                    prefix,
                    "Storage error while searching for backups"
                );
                return Err(e);
            }
        };
        info!(listed = listed.len(), prefix, "Listed objects");

        let candidates = select_candidates(listed, &self.pattern, &self.window, Utc::now());
        if candidates.is_empty() {
            warn!(prefix, pattern = %self.pattern.as_str(), "No recent backups found");
        }
        Ok(candidates)
    }

    async fn download_one(&self, object_name: &str) -> Result<DownloadedBackup, DownloadError> {
        let result = download_object(
            &self.store,
            &self.config.bucket,
            object_name,
            &self.config.destination,
            self.config.layout,
        )
        .await;
        if let Err(e) = &result {
            error!(key = object_name, error = %e, "Error while downloading");
        }
        result
    }

    async fn run_inner(&self, prefix: &str) -> RunReport {
        let shown_prefix = if prefix.is_empty() { "(root)" } else { prefix };
        info!(
            bucket = %self.config.bucket,
            prefix = shown_prefix,
            destination = %self.config.destination.display(),
            "Starting backup download"
        );

        let mut report = RunReport::default();
        let candidates = match self.list_candidates(prefix).await {
            Ok(candidates) => candidates,
            Err(_) => {
                report.listing_failed = true;
                Vec::new()
            }
        };

        if candidates.is_empty() {
            error!(
                listing_failed = report.listing_failed,
                "No recent backups found, nothing to download"
            );
            return report;
        }

        report.found = candidates.len();
        for candidate in &candidates {
            match self.download_one(&candidate.key).await {
                Ok(downloaded) => report.downloaded.push(downloaded),
                Err(_) => report.failed.push(candidate.key.clone()),
            }
        }

        info!(
            succeeded = report.succeeded(),
            total = report.found,
            "Downloads finished: {} succeeded",
            report.summary()
        );
        report
    }
}
