use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::S3(err.0)
    }
}

/// Object key for a contract's original document.
pub fn document_key(contract_id: Uuid, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("contracts/{contract_id}/original-{safe}")
}

/// Binary document storage. Writing the same key twice overwrites.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns the object's URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

pub struct S3DocumentStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint: String,
}

impl S3DocumentStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, endpoint: String) -> Self {
        Self {
            client,
            bucket,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DocumentStorage for S3DocumentStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError(format!("upload of {key} failed: {e}")))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError(format!("download of {key} failed: {e}")))?;
        let data = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError(format!("reading {key} failed: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::HashMap;

    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct MemoryDocumentStorage {
        objects: RwLock<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl DocumentStorage for MemoryDocumentStorage {
        async fn put(&self, key: &str, bytes: Vec<u8>, _: &str) -> Result<String, StorageError> {
            self.objects.write().await.insert(key.to_string(), bytes);
            Ok(format!("memory://{key}"))
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .read()
                .await
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError(format!("{key} not found")))
        }
    }
}
