//! S3-compatible blob store client.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Metadata key carrying the content hash.
const HASH_METADATA_KEY: &str = "content-sha256";

/// Configuration for the blob store client.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// S3 API endpoint URL.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Use TLS when talking to the endpoint.
    pub secure: bool,
    /// Default TTL for presigned URLs.
    pub presign_ttl: Duration,
}

impl BlobConfig {
    /// Create config from `BLOB_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint: std::env::var("BLOB_ENDPOINT")
                .map_err(|_| StorageError::config_error("BLOB_ENDPOINT not set"))?,
            access_key: std::env::var("BLOB_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("BLOB_ACCESS_KEY not set"))?,
            secret_key: std::env::var("BLOB_SECRET_KEY")
                .map_err(|_| StorageError::config_error("BLOB_SECRET_KEY not set"))?,
            bucket: std::env::var("BLOB_BUCKET")
                .map_err(|_| StorageError::config_error("BLOB_BUCKET not set"))?,
            region: std::env::var("BLOB_REGION").unwrap_or_else(|_| "auto".to_string()),
            secure: std::env::var("BLOB_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            presign_ttl: Duration::from_secs(
                std::env::var("PRESIGN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        })
    }

    fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else if self.secure {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Outcome of a put operation.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    /// Object key the content lives under.
    pub key: String,
    /// Hex-encoded content SHA-256.
    pub hash: String,
    /// False when an identical object already existed under the key.
    pub uploaded: bool,
}

/// Blob store client.
#[derive(Clone)]
pub struct BlobStore {
    client: Client,
    bucket: String,
    presign_ttl: Duration,
}

impl BlobStore {
    /// Create a new client from configuration.
    pub async fn new(config: BlobConfig) -> StorageResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "aicg");

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket,
            presign_ttl: config.presign_ttl,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(BlobConfig::from_env()?).await
    }

    /// Hex-encoded SHA-256 of a payload.
    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Store a blob under `key`.
    ///
    /// Two puts of identical content to the same key are idempotent:
    /// when the stored object's hash metadata matches, no upload is
    /// performed.
    pub async fn put(&self, key: &str, bytes: Vec<u8>, mime: &str) -> StorageResult<PutOutcome> {
        if key.is_empty() || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let hash = Self::content_hash(&bytes);

        if let Some(existing) = self.stored_hash(key).await? {
            if existing == hash {
                debug!("Identical content already stored at {}, skipping upload", key);
                return Ok(PutOutcome { key: key.to_string(), hash, uploaded: false });
            }
        }

        debug!("Uploading {} bytes to {}", bytes.len(), key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(mime)
            .metadata(HASH_METADATA_KEY, &hash)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {}", key);
        Ok(PutOutcome { key: key.to_string(), hash, uploaded: true })
    }

    /// Fetch a blob as bytes.
    pub async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(msg)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;

        Ok(data.into_bytes().to_vec())
    }

    /// Whether an object exists under `key`.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::download_failed(service_err.to_string()))
                }
            }
        }
    }

    /// Issue a presigned GET URL for `key`.
    pub async fn presign(&self, key: &str, ttl: Option<Duration>) -> StorageResult<String> {
        let ttl = ttl.unwrap_or(self.presign_ttl);
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    /// Delete a blob. Missing keys are not an error.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
        debug!("Deleted {}", key);
        Ok(())
    }

    /// Content hash stored with an object, if present.
    async fn stored_hash(&self, key: &str) -> StorageResult<Option<String>> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(head) => Ok(head
                .metadata()
                .and_then(|m| m.get(HASH_METADATA_KEY))
                .cloned()),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::download_failed(service_err.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_sha256() {
        let h = BlobStore::content_hash(b"hello");
        assert_eq!(h, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
        assert_eq!(h, BlobStore::content_hash(b"hello"));
        assert_ne!(h, BlobStore::content_hash(b"hello!"));
    }

    #[test]
    fn endpoint_url_applies_scheme() {
        let mut config = BlobConfig {
            endpoint: "minio.local:9000".into(),
            access_key: "k".into(),
            secret_key: "s".into(),
            bucket: "b".into(),
            region: "auto".into(),
            secure: false,
            presign_ttl: Duration::from_secs(3600),
        };
        assert_eq!(config.endpoint_url(), "http://minio.local:9000");
        config.secure = true;
        assert_eq!(config.endpoint_url(), "https://minio.local:9000");
        config.endpoint = "https://s3.example.com".into();
        assert_eq!(config.endpoint_url(), "https://s3.example.com");
    }
}
