//! # S3 storage client
//!
//! Implements [`ObjectStore`] from `backup-fetch-core` against any
//! S3-compatible endpoint (AWS, MinIO, ...) using `aws-sdk-s3`.
//!
//! - Construct with [`S3ObjectStore::connect`] from a [`ConnectionConfig`].
//! - Path-style addressing is always on, which is what MinIO expects.
//! - SDK retries are disabled; a failed request fails the operation.
//! - Listing follows continuation tokens until the provider reports no more pages.
//! - Downloads stream into `<file>.part` and are renamed into place once complete.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use backup_fetch_core::config::ConnectionConfig;
use backup_fetch_core::contract::{ListedObject, ObjectStore, StoreError};
use chrono::DateTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

pub struct S3ObjectStore {
    client: Client,
    endpoint_url: String,
}

/// Turn `host[:port]` plus the TLS flag into an endpoint URL.
///
/// A scheme, path, whitespace or a non-numeric port makes the endpoint malformed.
pub fn endpoint_url(endpoint: &str, secure: bool) -> Result<String> {
    let host_port = endpoint.trim().trim_end_matches('/');
    if host_port.is_empty() {
        bail!("S3 endpoint is empty");
    }
    if host_port.contains("://") {
        bail!("S3 endpoint {endpoint:?} must not include a scheme; use the `secure` flag instead");
    }
    if host_port.contains('/') || host_port.chars().any(char::is_whitespace) {
        bail!("S3 endpoint {endpoint:?} must be host[:port] without a path");
    }

    // [v6::addr]:port or host:port
    let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
        match rest.split_once(']') {
            Some((addr, tail)) => (addr, tail.strip_prefix(':')),
            None => bail!("S3 endpoint {endpoint:?} has an unterminated IPv6 address"),
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };
    if host.is_empty() {
        bail!("S3 endpoint {endpoint:?} has no host");
    }
    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            bail!("S3 endpoint {endpoint:?} has an invalid port {port:?}");
        }
    }

    let scheme = if secure { "https" } else { "http" };
    Ok(format!("{scheme}://{host_port}"))
}

fn part_path_for(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn write_body(mut body: ByteStream, path: &Path) -> Result<u64, StoreError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Stream `body` into the `.part` sibling, then move it onto `destination`.
async fn write_then_rename(
    body: ByteStream,
    part_path: &Path,
    destination: &Path,
) -> Result<u64, StoreError> {
    let written = write_body(body, part_path).await?;
    tokio::fs::rename(part_path, destination).await?;
    Ok(written)
}

impl S3ObjectStore {
    /// Build a client for the configured endpoint. Fails on a malformed endpoint.
    pub async fn connect(conn: &ConnectionConfig) -> Result<Self> {
        let endpoint_url = endpoint_url(&conn.endpoint, conn.secure).map_err(|e| {
            error!(error = %e, endpoint = %conn.endpoint, "Error connecting to S3 endpoint");
            e
        })?;

        let credentials = Credentials::new(
            &conn.access_key,
            &conn.secret_key,
            None,
            None,
            "backup-fetch",
        );
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(conn.region.clone()))
            .endpoint_url(&endpoint_url)
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();

        info!(endpoint = %endpoint_url, region = %conn.region, "Connected to S3 endpoint");
        Ok(Self {
            client: Client::from_conf(s3_config),
            endpoint_url,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ListedObject>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket);
            if !prefix.is_empty() {
                req = req.prefix(prefix);
            }
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.map_err(|e| {
                format!(
                    "S3 list objects in {bucket} failed: {}",
                    DisplayErrorContext(&e)
                )
            })?;
            pages += 1;

            for obj in resp.contents.unwrap_or_default() {
                let last_modified = obj
                    .last_modified
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                objects.push(ListedObject {
                    key: obj.key.unwrap_or_default(),
                    last_modified,
                    size: obj.size.unwrap_or(0).max(0) as u64,
                });
            }

            if resp.is_truncated == Some(true) {
                continuation_token = resp.next_continuation_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!(bucket, prefix, pages, objects = objects.len(), "Listing complete");
        Ok(objects)
    }

    async fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<(), StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| format!("S3 get object {key} failed: {}", DisplayErrorContext(&e)))?;

        let part_path = part_path_for(destination);
        match write_then_rename(resp.body, &part_path, destination).await {
            Ok(written) => {
                debug!(key, bytes = written, path = %destination.display(), "Object written");
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                    debug!(error = %cleanup, path = %part_path.display(), "Could not remove partial file");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_gets_scheme_from_secure_flag() {
        assert_eq!(
            endpoint_url("minio.example.com", true).unwrap(),
            "https://minio.example.com"
        );
        assert_eq!(
            endpoint_url("localhost:9000", false).unwrap(),
            "http://localhost:9000"
        );
        assert_eq!(
            endpoint_url("[::1]:9000", false).unwrap(),
            "http://[::1]:9000"
        );
        assert_eq!(
            endpoint_url("minio.example.com/", true).unwrap(),
            "https://minio.example.com"
        );
    }

    #[test]
    fn malformed_endpoints_are_rejected() {
        for endpoint in [
            "",
            "https://minio.example.com",
            "minio.example.com/bucket",
            "minio.example.com:port",
            "minio.example.com:70000",
            ":9000",
            "[::1:9000",
            "minio example.com",
        ] {
            assert!(
                endpoint_url(endpoint, true).is_err(),
                "{endpoint:?} should be rejected"
            );
        }
    }

    #[test]
    fn part_file_sits_next_to_destination() {
        assert_eq!(
            part_path_for(Path::new("/tmp/out/DATA_2024.bak")),
            PathBuf::from("/tmp/out/DATA_2024.bak.part")
        );
    }

    #[tokio::test]
    async fn connect_disables_sdk_retries() {
        let conn = ConnectionConfig {
            endpoint: "127.0.0.1:9000".into(),
            access_key: "access".into(),
            secret_key: "secret".into(),
            secure: false,
            region: "us-east-1".into(),
        };
        let store = S3ObjectStore::connect(&conn).await.expect("client should build");
        let attempts = store.client.config().retry_config().map(|r| r.max_attempts());
        assert_eq!(attempts, Some(1));
    }

    #[tokio::test]
    async fn connect_builds_client_without_network() {
        let conn = ConnectionConfig {
            endpoint: "127.0.0.1:9000".into(),
            access_key: "access".into(),
            secret_key: "secret".into(),
            secure: false,
            region: "us-east-1".into(),
        };
        let store = S3ObjectStore::connect(&conn).await.expect("client should build");
        assert_eq!(store.endpoint_url(), "http://127.0.0.1:9000");
    }

    #[tokio::test]
    async fn connect_fails_on_malformed_endpoint() {
        let conn = ConnectionConfig {
            endpoint: "http://127.0.0.1:9000".into(),
            access_key: "access".into(),
            secret_key: "secret".into(),
            secure: false,
            region: "us-east-1".into(),
        };
        assert!(S3ObjectStore::connect(&conn).await.is_err());
    }

    mod replayed {
        use super::*;
        use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
        use aws_sdk_s3::operation::list_objects_v2::{ListObjectsV2Error, ListObjectsV2Output};
        use aws_sdk_s3::primitives::DateTime as S3DateTime;
        use aws_sdk_s3::types::error::{NoSuchBucket, NoSuchKey};
        use aws_sdk_s3::types::Object;
        use aws_smithy_mocks::{mock, mock_client, RuleMode};
        use aws_smithy_types::body::SdkBody;

        fn store_with(client: Client) -> S3ObjectStore {
            S3ObjectStore {
                client,
                endpoint_url: "http://replayed.invalid".into(),
            }
        }

        fn object(key: &str, modified_secs: i64, size: i64) -> Object {
            Object::builder()
                .key(key)
                .last_modified(S3DateTime::from_secs(modified_secs))
                .size(size)
                .build()
        }

        #[tokio::test]
        async fn listing_follows_continuation_tokens_in_listing_order() {
            let first_page = mock!(aws_sdk_s3::Client::list_objects_v2)
                .match_requests(|req| {
                    req.bucket() == Some("backups")
                        && req.prefix() == Some("folder/")
                        && req.continuation_token().is_none()
                })
                .then_output(|| {
                    ListObjectsV2Output::builder()
                        .contents(object("folder/z/DATA_3.bak", 1_717_322_400, 30))
                        .contents(object("folder/a/DATA_1.bak", 1_717_326_000, 10))
                        .is_truncated(true)
                        .next_continuation_token("page-2")
                        .build()
                });
            let second_page = mock!(aws_sdk_s3::Client::list_objects_v2)
                .match_requests(|req| {
                    req.prefix() == Some("folder/") && req.continuation_token() == Some("page-2")
                })
                .then_output(|| {
                    ListObjectsV2Output::builder()
                        .contents(Object::builder().key("folder/m/DATA_2.bak").size(20).build())
                        .is_truncated(false)
                        .build()
                });
            let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&first_page, &second_page]);

            let listed = store_with(client)
                .list_objects("backups", "folder/")
                .await
                .expect("listing should succeed");

            let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();
            assert_eq!(
                keys,
                vec!["folder/z/DATA_3.bak", "folder/a/DATA_1.bak", "folder/m/DATA_2.bak"]
            );
            assert_eq!(listed[0].last_modified, DateTime::from_timestamp(1_717_322_400, 0));
            assert_eq!(listed[1].size, 10);
            assert_eq!(listed[2].last_modified, None);
            assert_eq!(first_page.num_calls(), 1);
            assert_eq!(second_page.num_calls(), 1);
        }

        #[tokio::test]
        async fn listing_error_carries_the_bucket() {
            let missing = mock!(aws_sdk_s3::Client::list_objects_v2).then_error(|| {
                ListObjectsV2Error::NoSuchBucket(NoSuchBucket::builder().build())
            });
            let client = mock_client!(aws_sdk_s3, [&missing]);

            let err = store_with(client)
                .list_objects("backups", "")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("backups"), "got: {err}");
        }

        #[tokio::test]
        async fn fetched_body_lands_on_destination_without_part_file() {
            let get = mock!(aws_sdk_s3::Client::get_object)
                .match_requests(|req| {
                    req.bucket() == Some("backups") && req.key() == Some("folder/DATA_1.bak")
                })
                .then_output(|| {
                    GetObjectOutput::builder()
                        .body(ByteStream::from_static(b"backup payload"))
                        .build()
                });
            let store = store_with(mock_client!(aws_sdk_s3, [&get]));
            let dir = tempfile::tempdir().unwrap();
            let destination = dir.path().join("DATA_1.bak");

            store
                .fetch_object("backups", "folder/DATA_1.bak", &destination)
                .await
                .expect("download should succeed");

            assert_eq!(std::fs::read(&destination).unwrap(), b"backup payload");
            assert!(!part_path_for(&destination).exists());
        }

        #[tokio::test]
        async fn failed_body_stream_removes_part_file() {
            let get = mock!(aws_sdk_s3::Client::get_object).then_output(|| {
                GetObjectOutput::builder()
                    .body(ByteStream::new(SdkBody::taken()))
                    .build()
            });
            let store = store_with(mock_client!(aws_sdk_s3, [&get]));
            let dir = tempfile::tempdir().unwrap();
            let destination = dir.path().join("DATA_1.bak");

            let result = store
                .fetch_object("backups", "folder/DATA_1.bak", &destination)
                .await;

            assert!(result.is_err());
            assert!(!destination.exists());
            assert!(!part_path_for(&destination).exists());
        }

        #[tokio::test]
        async fn failed_rename_removes_part_file() {
            let get = mock!(aws_sdk_s3::Client::get_object).then_output(|| {
                GetObjectOutput::builder()
                    .body(ByteStream::from_static(b"backup payload"))
                    .build()
            });
            let store = store_with(mock_client!(aws_sdk_s3, [&get]));
            let dir = tempfile::tempdir().unwrap();
            // an existing non-empty directory cannot be replaced by a file
            let destination = dir.path().join("DATA_1.bak");
            std::fs::create_dir(&destination).unwrap();
            std::fs::write(destination.join("keep"), b"x").unwrap();

            let result = store
                .fetch_object("backups", "folder/DATA_1.bak", &destination)
                .await;

            assert!(result.is_err());
            assert!(destination.join("keep").is_file());
            assert!(!part_path_for(&destination).exists());
        }

        #[tokio::test]
        async fn missing_object_is_reported_without_touching_disk() {
            let get = mock!(aws_sdk_s3::Client::get_object)
                .then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
            let store = store_with(mock_client!(aws_sdk_s3, [&get]));
            let dir = tempfile::tempdir().unwrap();
            let destination = dir.path().join("DATA_missing.bak");

            let err = store
                .fetch_object("backups", "folder/DATA_missing.bak", &destination)
                .await
                .unwrap_err();

            assert!(err.to_string().contains("folder/DATA_missing.bak"), "got: {err}");
            assert!(!destination.exists());
            assert!(!part_path_for(&destination).exists());
        }
    }
}
