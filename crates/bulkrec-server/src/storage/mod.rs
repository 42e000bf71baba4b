//! S3-compatible object storage used for chunk staging
//!
//! Every object is written with a `sha256` metadata entry holding the hex
//! digest of its body, so a staged chunk can be checked by hand against what
//! the orchestrator produced.

pub mod config;

use anyhow::{Context, Result};
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    operation::get_object::GetObjectError,
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use config::StorageConfig;

/// Object metadata key carrying the body digest
pub const CHECKSUM_METADATA_KEY: &str = "sha256";

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

/// What was written by [`Storage::put_object`]
#[derive(Debug, Clone)]
pub struct PutReceipt {
    pub key: String,
    pub sha256: String,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ListedObject {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let StorageConfig {
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
            path_style,
        } = config;
        debug!(endpoint = ?endpoint, %region, "Initializing staging storage");

        let credentials = Credentials::new(access_key, secret_key, None, None, "bulkrec-staging");
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            .force_path_style(path_style);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(%bucket, "Staging storage ready");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket, bytes = body.len()))]
    pub async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<PutReceipt> {
        let sha256 = hex_sha256(&body);
        let bytes = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .metadata(CHECKSUM_METADATA_KEY, &sha256)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("Failed to write s3://{}/{}", self.bucket, key))?;

        debug!(key, sha256 = %sha256, "Object written");

        Ok(PutReceipt {
            key: key.to_string(),
            sha256,
            bytes,
        })
    }

    /// Object body, or `None` when the key does not exist
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) => {
                return Ok(None)
            },
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read s3://{}/{}", self.bucket, key))
            },
        };

        let body = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of s3://{}/{}", self.bucket, key))?
            .into_bytes()
            .to_vec();

        debug!(key, bytes = body.len(), "Object read");
        Ok(Some(body))
    }

    /// Deleting a missing key is not an error
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;
        Ok(())
    }

    /// Every object under `prefix`, following continuation tokens
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<ListedObject>> {
        let mut listed = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let page = request
                .send()
                .await
                .with_context(|| format!("Failed to list s3://{}/{}", self.bucket, prefix))?;

            listed.extend(page.contents().iter().filter_map(|object| {
                Some(ListedObject {
                    key: object.key()?.to_string(),
                    last_modified: object
                        .last_modified()
                        .and_then(|at| DateTime::<Utc>::from_timestamp(at.secs(), at.subsec_nanos())),
                })
            }));

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(prefix, count = listed.len(), "Objects listed");
        Ok(listed)
    }
}

pub fn hex_sha256(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_hex_and_line_ending_sensitive() {
        let lf = hex_sha256(b"record_code,name\n");
        assert_eq!(lf.len(), 64);
        assert!(lf.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(lf, hex_sha256(b"record_code,name\r\n"));
    }

    #[tokio::test]
    async fn test_client_builds_without_network() {
        let storage = Storage::new(StorageConfig::for_minio("http://localhost:9000", "staging-bucket"))
            .await
            .unwrap();
        assert_eq!(storage.bucket(), "staging-bucket");
    }
}
