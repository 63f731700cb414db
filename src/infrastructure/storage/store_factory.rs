use std::path::PathBuf;
use std::sync::Arc;

use crate::application::ports::{ObjectStorage, ObjectStorageError};
use crate::presentation::config::{StorageProviderSetting, StorageSettings};

use super::object_store_storage::ObjectStoreStorage;

pub struct ObjectStorageFactory;

impl ObjectStorageFactory {
    pub fn create(
        settings: &StorageSettings,
    ) -> Result<Arc<dyn ObjectStorage>, ObjectStorageError> {
        match settings.provider {
            StorageProviderSetting::Gcs => {
                let bucket = settings
                    .bucket
                    .as_deref()
                    .filter(|b| !b.trim().is_empty())
                    .ok_or_else(|| {
                        ObjectStorageError::RequestFailed("storage.bucket required for gcs".into())
                    })?;
                tracing::info!(bucket = %bucket, "Using Google Cloud Storage");
                let store =
                    ObjectStoreStorage::gcs(bucket, settings.service_account_path.as_deref())?;
                Ok(Arc::new(store))
            }
            StorageProviderSetting::Local => {
                tracing::info!(path = %settings.local_path, "Using local object storage");
                let store = ObjectStoreStorage::local(PathBuf::from(&settings.local_path))?;
                Ok(Arc::new(store))
            }
            StorageProviderSetting::Memory => {
                tracing::warn!("Using in-memory object storage, objects are lost on restart");
                Ok(Arc::new(ObjectStoreStorage::in_memory()))
            }
        }
    }
}
