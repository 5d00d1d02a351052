//! S3-compatible object store.
//!
//! Works against AWS S3, MinIO, and NAS appliance endpoints. Path-style
//! addressing is required for everything that is not real AWS.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Builder, Credentials, Region},
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;

use super::backend::{BoxReader, ObjectStore, StorageError, StorageResult};
use crate::config::Config;

/// S3-compatible object store
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from static credentials and a custom endpoint.
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
        bucket: &str,
        force_path_style: bool,
    ) -> Self {
        let creds = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .force_path_style(force_path_style)
            .credentials_provider(creds)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
            &config.s3_region,
            &config.s3_bucket,
            config.s3_force_path_style,
        )
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let length = data.len() as i64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_length(length)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("put key={}: {}", key, e)))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<BoxReader> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let err_str = e.to_string();
                if err_str.contains("NoSuchKey") || err_str.contains("404") {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Transport(format!("get key={}: {}", key, err_str))
                }
            })?;

        Ok(Box::new(result.body.into_async_read()))
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("404")
                    || err_str.contains("NoSuchKey")
                    || err_str.contains("NotFound")
                {
                    Ok(false)
                } else {
                    Err(StorageError::Transport(format!(
                        "head key={}: {}",
                        key, err_str
                    )))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        // S3 DeleteObject succeeds for missing keys, so this is idempotent.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("delete key={}: {}", key, e)))?;

        Ok(())
    }
}
