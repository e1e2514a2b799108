use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Metadata returned by a head request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
}

/// Object operations the storage handler forwards to the backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StorageError>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// S3-compatible object storage.
pub struct S3Store {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Store {
    pub fn new(region: Region, credentials: Credentials) -> Self {
        Self {
            region,
            credentials,
            path_style: false,
        }
    }

    /// Address buckets as `endpoint/bucket`, as local S3 emulators expect.
    pub fn with_path_style(mut self) -> Self {
        self.path_style = true;
        self
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(StorageError::S3)?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

fn check_status(code: u16) -> Result<(), StorageError> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(StorageError::Status(code))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let response = self
            .bucket(bucket)?
            .put_object(key, data)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket(bucket)?
            .get_object(key)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code())?;
        Ok(response.to_vec())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StorageError> {
        let (head, code) = self
            .bucket(bucket)?
            .head_object(key)
            .await
            .map_err(StorageError::S3)?;
        check_status(code)?;
        Ok(ObjectHead {
            content_length: head.content_length.unwrap_or_default().max(0) as u64,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let response = self
            .bucket(bucket)?
            .delete_object(key)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let pages = self
            .bucket(bucket)?
            .list(prefix.to_string(), None)
            .await
            .map_err(StorageError::S3)?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }
}

/// File-oriented storage operations.
///
/// Backend failures are logged and reported as `false`, `None` or an empty
/// list rather than returned as errors.
pub struct StorageHandler {
    store: Arc<dyn ObjectStore>,
}

impl StorageHandler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload a local file.
    pub async fn upload_file(&self, path: impl AsRef<Path>, bucket: &str, key: &str) -> bool {
        let path = path.as_ref();
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read file for upload");
                return false;
            }
        };
        self.upload_bytes(&data, bucket, key).await
    }

    pub async fn upload_bytes(&self, data: &[u8], bucket: &str, key: &str) -> bool {
        match self.store.put_object(bucket, key, data).await {
            Ok(()) => {
                tracing::info!(bucket = %bucket, key = %key, size = data.len(), "Object uploaded");
                true
            }
            Err(e) => {
                tracing::error!(bucket = %bucket, key = %key, error = %e, "Failed to upload object");
                false
            }
        }
    }

    /// Download an object to a local path.
    pub async fn download_file(&self, bucket: &str, key: &str, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let Some(data) = self.get_file_object(bucket, key).await else {
            return false;
        };
        match tokio::fs::write(path, &data).await {
            Ok(()) => {
                tracing::info!(bucket = %bucket, key = %key, path = %path.display(), "Object downloaded");
                true
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write downloaded object");
                false
            }
        }
    }

    pub async fn check_file_exists(&self, bucket: &str, key: &str) -> bool {
        self.store.head_object(bucket, key).await.is_ok()
    }

    /// Size in bytes, or `None` when the object cannot be found.
    pub async fn check_file_size(&self, bucket: &str, key: &str) -> Option<u64> {
        match self.store.head_object(bucket, key).await {
            Ok(head) => Some(head.content_length),
            Err(e) => {
                tracing::warn!(bucket = %bucket, key = %key, error = %e, "Failed to read object size");
                None
            }
        }
    }

    /// Delete an object. Deleting a missing object reports `false`.
    pub async fn delete_file(&self, bucket: &str, key: &str) -> bool {
        if !self.check_file_exists(bucket, key).await {
            tracing::warn!(bucket = %bucket, key = %key, "Object to delete does not exist");
            return false;
        }
        match self.store.delete_object(bucket, key).await {
            Ok(()) => {
                tracing::info!(bucket = %bucket, key = %key, "Object deleted");
                true
            }
            Err(e) => {
                tracing::error!(bucket = %bucket, key = %key, error = %e, "Failed to delete object");
                false
            }
        }
    }

    pub async fn list_files(&self, bucket: &str, prefix: Option<&str>) -> Vec<String> {
        match self.store.list_objects(bucket, prefix.unwrap_or_default()).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(bucket = %bucket, error = %e, "Failed to list objects");
                Vec::new()
            }
        }
    }

    pub async fn get_file_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        match self.store.get_object(bucket, key).await {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::error!(bucket = %bucket, key = %key, error = %e, "Failed to read object");
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 request returned status {0}")]
    Status(u16),
}
