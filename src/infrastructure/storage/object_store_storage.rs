use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::{
    Attribute, Attributes, MultipartUpload, ObjectStore, PutMultipartOpts, PutPayload,
};
use tracing::instrument;

use crate::application::ports::{ObjectStorage, ObjectStorageError};
use crate::domain::ObjectName;

#[derive(Debug, Clone)]
enum Location {
    Gcs { bucket: String },
    Local { root: PathBuf },
    Memory,
}

/// `ObjectStorage` over any `object_store` backend: Google Cloud Storage in
/// production, a local directory or memory otherwise.
pub struct ObjectStoreStorage {
    inner: Arc<dyn ObjectStore>,
    location: Location,
}

impl ObjectStoreStorage {
    /// Credentials come from `service_account_path` when given, else from the
    /// usual `GOOGLE_*` environment variables.
    pub fn gcs(
        bucket: &str,
        service_account_path: Option<&str>,
    ) -> Result<Self, ObjectStorageError> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(path) = service_account_path {
            builder = builder.with_service_account_path(path);
        }
        let store = builder
            .build()
            .map_err(|e| ObjectStorageError::RequestFailed(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(store),
            location: Location::Gcs {
                bucket: bucket.to_string(),
            },
        })
    }

    pub fn local(root: PathBuf) -> Result<Self, ObjectStorageError> {
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        let fs = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| ObjectStorageError::RequestFailed(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(fs),
            location: Location::Local { root },
        })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            location: Location::Memory,
        }
    }

    fn put_options(&self, content_type: &str) -> PutMultipartOpts {
        // The local filesystem backend rejects object attributes.
        if matches!(self.location, Location::Local { .. }) || content_type.is_empty() {
            return PutMultipartOpts::default();
        }
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        PutMultipartOpts {
            attributes,
            ..Default::default()
        }
    }
}

fn store_path(name: &ObjectName) -> StorePath {
    StorePath::from(name.as_str())
}

#[async_trait::async_trait]
impl ObjectStorage for ObjectStoreStorage {
    #[instrument(skip(self, stream), fields(object = %name))]
    async fn upload(
        &self,
        mut stream: BoxStream<'_, Result<Bytes, io::Error>>,
        name: &ObjectName,
        content_type: &str,
    ) -> Result<(ObjectName, u64), ObjectStorageError> {
        let mut upload = self
            .inner
            .put_multipart_opts(&store_path(name), self.put_options(content_type))
            .await
            .map_err(|e| ObjectStorageError::UploadFailed(e.to_string()))?;

        let mut total_bytes: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    let _ = upload.abort().await;
                    return Err(ObjectStorageError::Io(e));
                }
            };
            total_bytes += bytes.len() as u64;
            if let Err(e) = upload.put_part(PutPayload::from(bytes)).await {
                let _ = upload.abort().await;
                return Err(ObjectStorageError::UploadFailed(e.to_string()));
            }
        }

        upload
            .complete()
            .await
            .map_err(|e| ObjectStorageError::UploadFailed(e.to_string()))?;

        tracing::debug!(bytes = total_bytes, "Object uploaded");
        Ok((name.clone(), total_bytes))
    }

    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn rename(&self, from: &ObjectName, to: &ObjectName) -> Result<(), ObjectStorageError> {
        self.inner
            .rename(&store_path(from), &store_path(to))
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => {
                    ObjectStorageError::NotFound(from.to_string())
                }
                other => ObjectStorageError::RenameFailed(other.to_string()),
            })
    }

    #[instrument(skip(self), fields(object = %name))]
    async fn delete(&self, name: &ObjectName) -> Result<(), ObjectStorageError> {
        self.inner
            .delete(&store_path(name))
            .await
            .map_err(|e| ObjectStorageError::DeleteFailed(e.to_string()))
    }

    async fn exists(&self, name: &ObjectName) -> Result<bool, ObjectStorageError> {
        match self.inner.head(&store_path(name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ObjectStorageError::RequestFailed(e.to_string())),
        }
    }

    fn object_uri(&self, name: &ObjectName) -> String {
        match &self.location {
            Location::Gcs { bucket } => format!("gs://{}/{}", bucket, name),
            Location::Local { root } => format!("file://{}/{}", root.display(), name),
            Location::Memory => format!("memory:///{}", name),
        }
    }
}
