//! Object storage for processed artifacts
//!
//! Single-shot S3 transfers: the combined Parquet file is small enough that
//! multipart uploads are not needed. Credentials follow the AWS default chain
//! (environment, profile, instance metadata); only the region and an optional
//! custom endpoint are configured here.

use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::constants::{files, storage};
use crate::errors::{UploadError, UploadResult};

/// Bucket settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Target bucket; uploads are refused while unset
    pub bucket: Option<String>,
    /// Default object key of the combined artifact
    pub key: String,
    pub region: String,
    /// S3-compatible endpoint (MinIO, LocalStack, ...)
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            key: storage::DEFAULT_KEY.to_string(),
            region: storage::DEFAULT_REGION.to_string(),
            endpoint_url: None,
        }
    }
}

/// S3 bucket handle
#[derive(Debug, Clone)]
pub struct BucketStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl BucketStore {
    /// Build a client for the configured bucket
    ///
    /// # Errors
    ///
    /// Returns `UploadError::MissingBucket` if no bucket is configured
    pub async fn new(config: &StorageConfig) -> UploadResult<Self> {
        let bucket = config
            .bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(UploadError::MissingBucket)?
            .to_string();

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        // Custom endpoints are usually path-style only
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        tracing::debug!("Using bucket {} in {}", bucket, config.region);
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `s3://bucket/key` for `key`
    pub fn object_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_start_matches('/'))
    }

    /// Upload `local` to `key`
    ///
    /// # Errors
    ///
    /// Returns `UploadError::MissingFile` if `local` does not exist, and
    /// `UploadError::Transport` if the service rejects the request
    pub async fn upload(&self, local: &Path, key: &str) -> UploadResult<String> {
        if !tokio::fs::try_exists(local).await.unwrap_or(false) {
            return Err(UploadError::MissingFile {
                path: local.to_path_buf(),
            });
        }

        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| UploadError::Transport {
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Transport {
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let url = self.object_url(key);
        tracing::info!("File successfully uploaded: {}", url);
        Ok(url)
    }

    /// Download `key` to `local`, replacing it atomically
    pub async fn download(&self, key: &str, local: &Path) -> UploadResult<PathBuf> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| UploadError::Transport {
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| UploadError::Transport {
                message: e.to_string(),
            })?
            .into_bytes();

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = PathBuf::from(format!("{}{}", local.display(), files::TEMP_FILE_SUFFIX));
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, local).await?;

        tracing::info!(
            "Downloaded {} ({} bytes) to {}",
            self.object_url(key),
            bytes.len(),
            local.display()
        );
        Ok(local.to_path_buf())
    }
}
