use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::LocalLayout;
use crate::contract::{ObjectStore, StoreError};

const MIB: f64 = 1024.0 * 1024.0;

/// A backup copied to local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedBackup {
    pub key: String,
    pub local_path: PathBuf,
    /// Size of the local file after the download, in bytes.
    pub bytes: u64,
}

impl DownloadedBackup {
    pub fn size_mib(&self) -> f64 {
        self.bytes as f64 / MIB
    }
}

#[derive(Debug)]
pub enum DownloadError {
    /// The key does not map to a usable local file name.
    InvalidKey(String),
    Io(std::io::Error),
    Store(StoreError),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::InvalidKey(key) => write!(f, "key {key:?} has no usable local file name"),
            DownloadError::Io(e) => write!(f, "local I/O error: {e}"),
            DownloadError::Store(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io(e)
    }
}

fn is_usable_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".."
}

/// Map an object key to its path below `destination`.
///
/// `Flatten` keeps the final key segment only, ignoring trailing slashes, so
/// `folder/sub/` becomes `sub`. `Preserve` recreates every segment as a
/// directory; empty segments (`a//b`, `a/b/`) are collapsed and `.`/`..`
/// segments are refused so nothing lands outside `destination`.
pub fn local_path_for(
    destination: &Path,
    key: &str,
    layout: LocalLayout,
) -> Result<PathBuf, DownloadError> {
    match layout {
        LocalLayout::Flatten => {
            let trimmed = key.trim_end_matches('/');
            let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
            if !is_usable_segment(name) {
                return Err(DownloadError::InvalidKey(key.to_string()));
            }
            Ok(destination.join(name))
        }
        LocalLayout::Preserve => {
            let mut path = destination.to_path_buf();
            let mut pushed = 0;
            for segment in key.split('/').filter(|s| !s.is_empty()) {
                if !is_usable_segment(segment) {
                    return Err(DownloadError::InvalidKey(key.to_string()));
                }
                path.push(segment);
                pushed += 1;
            }
            if pushed == 0 {
                return Err(DownloadError::InvalidKey(key.to_string()));
            }
            Ok(path)
        }
    }
}

/// Fetch one object into `destination` and report what landed on disk.
///
/// The returned size is read back from the file system, not taken from the listing.
pub async fn download_object<S>(
    store: &S,
    bucket: &str,
    key: &str,
    destination: &Path,
    layout: LocalLayout,
) -> Result<DownloadedBackup, DownloadError>
where
    S: ObjectStore + ?Sized,
{
    let local_path = local_path_for(destination, key, layout)?;
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
        debug!(path = %parent.display(), "Ensured parent directory");
    }

    info!(key, local_path = %local_path.display(), "Downloading object");
    store
        .fetch_object(bucket, key, &local_path)
        .await
        .map_err(DownloadError::Store)?;

    let bytes = tokio::fs::metadata(&local_path).await?.len();
    let downloaded = DownloadedBackup {
        key: key.to_string(),
        local_path,
        bytes,
    };
    info!(
        key,
        local_path = %downloaded.local_path.display(),
        bytes,
        "Download succeeded ({:.2} MB)",
        downloaded.size_mib()
    );
    Ok(downloaded)
}
