use std::io;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domain::ObjectName;

#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Streams an object into the bucket and returns its name and size in bytes.
    async fn upload(
        &self,
        stream: BoxStream<'_, Result<Bytes, io::Error>>,
        name: &ObjectName,
        content_type: &str,
    ) -> Result<(ObjectName, u64), ObjectStorageError>;

    async fn rename(&self, from: &ObjectName, to: &ObjectName) -> Result<(), ObjectStorageError>;

    async fn delete(&self, name: &ObjectName) -> Result<(), ObjectStorageError>;

    async fn exists(&self, name: &ObjectName) -> Result<bool, ObjectStorageError>;

    /// URI under which the ingestion service can read the object, e.g. `gs://bucket/name`.
    fn object_uri(&self, name: &ObjectName) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("rename failed: {0}")]
    RenameFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("storage request failed: {0}")]
    RequestFailed(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
