//! S3-backed blob store.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use lookbook_core::storage::{BlobStore, StorageError};

/// Blob store over a single S3 bucket. Keys are object keys verbatim.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the ambient AWS configuration (environment,
    /// profile, instance metadata).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn namespace(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    StorageError::NotFound(key.to_owned())
                } else {
                    StorageError::Backend(format!(
                        "get s3://{}/{key}: {}",
                        self.bucket,
                        DisplayErrorContext(&service_err)
                    ))
                }
            })?;

        let data = output.body.collect().await.map_err(|e| {
            StorageError::Backend(format!("read s3://{}/{key}: {e}", self.bucket))
        })?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| {
                StorageError::Backend(format!(
                    "put s3://{}/{key}: {}",
                    self.bucket,
                    DisplayErrorContext(&err)
                ))
            })?;

        tracing::debug!(bucket = %self.bucket, key, size, "Stored blob in S3");
        Ok(())
    }
}
