//! # contract: the storage seam
//!
//! The fetch pipeline talks to object storage only through [`ObjectStore`].
//! The CLI crate implements it against a real S3-compatible endpoint; tests
//! use the `mockall`-generated `MockObjectStore`.
//!
//! Implementors own their connection (endpoint, credentials, TLS) and are
//! responsible for pagination. All failures are returned as a boxed
//! [`StoreError`]; the pipeline never inspects them beyond logging.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Error type for ObjectStore (boxed so any client error fits).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// One entry of a bucket listing, as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedObject {
    /// Full key within the bucket.
    pub key: String,
    /// Last modification instant, if the store reported one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Size in bytes as listed.
    pub size: u64,
}

/// Read-only access to an S3-compatible bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object under `prefix`, recursively, in the order the provider returns them.
    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<Vec<ListedObject>, StoreError>;

    /// Fetch a single object and write its full contents to `destination`.
    ///
    /// The parent directory of `destination` already exists when this is called.
    async fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<(), StoreError>;
}
