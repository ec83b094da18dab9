use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Default recency window: objects modified in the last day count as recent backups.
pub const DEFAULT_MAX_AGE_HOURS: u64 = 24;

/// Default signing region. MinIO and most S3-compatible servers accept it.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection parameters for an S3-compatible endpoint.
///
/// Built once by the config loader and handed to the storage client, which
/// keeps it for its whole lifetime.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// `host[:port]`, without scheme or path.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Use TLS (`https`) when true, plain `http` otherwise.
    pub secure: bool,
    pub region: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("secure", &self.secure)
            .field("region", &self.region)
            .finish()
    }
}

/// Where each downloaded object lands below the destination directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalLayout {
    /// Keep only the final path segment of the key: `a/b/file.bak` -> `<dest>/file.bak`.
    #[default]
    Flatten,
    /// Recreate the key's directories: `a/b/file.bak` -> `<dest>/a/b/file.bak`.
    Preserve,
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub bucket: String,
    /// Prefix to list under. Empty means the bucket root.
    #[serde(default)]
    pub prefix: String,
    pub destination: PathBuf,
    /// Case-insensitive regex matched from the start of each key.
    pub pattern: String,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    #[serde(default)]
    pub layout: LocalLayout,
}

fn default_max_age_hours() -> u64 {
    DEFAULT_MAX_AGE_HOURS
}

impl FetchConfig {
    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            destination = %self.destination.display(),
            pattern = %self.pattern,
            max_age_hours = self.max_age_hours,
            layout = ?self.layout,
            "Loaded FetchConfig"
        );
        debug!(?self, "FetchConfig loaded (full debug)");
    }
}

impl ConnectionConfig {
    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.endpoint,
            secure = self.secure,
            region = %self.region,
            access_key_set = !self.access_key.is_empty(),
            "Loaded ConnectionConfig"
        );
    }
}
