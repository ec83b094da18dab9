//! `load_config` module: Loads a static YAML config and injects the S3 credentials from the environment.
//!
//! The YAML file carries everything except secrets:
//!
//! ```yaml
//! connection:
//!   endpoint: minio.example.com
//!   secure: true
//!   region: us-east-1
//! fetch:
//!   bucket: bucket-name
//!   prefix: folder/
//!   destination: ./downloads
//!   pattern: '.*DATA.*\.bak$'
//!   max_age_hours: 24
//!   layout: flatten
//! ```
//!
//! `S3_ACCESS_KEY` and `S3_SECRET_KEY` supply the credentials. All errors are
//! `anyhow::Error`s and surface at the CLI boundary.

use anyhow::{bail, Result};
use backup_fetch_core::config::{ConnectionConfig, FetchConfig, DEFAULT_REGION};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const ACCESS_KEY_VAR: &str = "S3_ACCESS_KEY";
pub const SECRET_KEY_VAR: &str = "S3_SECRET_KEY";

#[derive(Debug)]
pub struct CliConfig {
    pub connection: ConnectionConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionSection {
    pub endpoint: String,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_secure() -> bool {
    true
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn secret_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => {
            info!(var, "Credential found in env");
            Ok(value)
        }
        Ok(_) => {
            error!(var, "Credential environment variable is empty");
            bail!("{var} environment variable is empty")
        }
        Err(e) => {
            error!(error = ?e, var, "Credential environment variable not set");
            bail!("{var} environment variable not set: {e}")
        }
    }
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        connection: ConnectionSection,
        fetch: FetchConfig,
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if raw.connection.endpoint.trim().is_empty() {
        bail!("connection.endpoint must not be empty");
    }
    if raw.fetch.bucket.trim().is_empty() {
        bail!("fetch.bucket must not be empty");
    }
    if raw.fetch.pattern.is_empty() {
        bail!("fetch.pattern must not be empty");
    }
    if raw.fetch.max_age_hours == 0 {
        bail!("fetch.max_age_hours must be at least 1");
    }

    let connection = ConnectionConfig {
        endpoint: raw.connection.endpoint,
        access_key: secret_from_env(ACCESS_KEY_VAR)?,
        secret_key: secret_from_env(SECRET_KEY_VAR)?,
        secure: raw.connection.secure,
        region: raw.connection.region,
    };

    info!(
        endpoint = %connection.endpoint,
        bucket = %raw.fetch.bucket,
        destination = %raw.fetch.destination.display(),
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        connection,
        fetch: raw.fetch,
    })
}
