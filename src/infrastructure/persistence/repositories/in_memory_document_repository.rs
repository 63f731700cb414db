use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::application::ports::{DocumentRepository, RepositoryError};
use crate::domain::{DocumentFieldsUpdate, DocumentRecord, DocumentStatus, FileId};

/// Process-local document store for local runs and tests.
#[derive(Default)]
pub struct InMemoryDocumentRepository {
    records: RwLock<HashMap<FileId, DocumentRecord>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn create(&self, record: &DocumentRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.file_id) {
            return Err(RepositoryError::AlreadyExists(record.file_id.to_string()));
        }
        records.insert(record.file_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, file_id: &FileId) -> Result<Option<DocumentRecord>, RepositoryError> {
        Ok(self.records.read().await.get(file_id).cloned())
    }

    async fn update_status(
        &self,
        file_id: &FileId,
        status: DocumentStatus,
        error_msg: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(file_id)
            .ok_or_else(|| RepositoryError::NotFound(file_id.to_string()))?;

        record.status = status;
        record.error_msg = error_msg.map(str::to_string);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_fields(
        &self,
        file_id: &FileId,
        update: &DocumentFieldsUpdate,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(file_id)
            .ok_or_else(|| RepositoryError::NotFound(file_id.to_string()))?;

        if let Some(gcs_object) = &update.gcs_object {
            record.gcs_object = Some(gcs_object.clone());
        }
        if let Some(rag_file_id) = &update.rag_file_id {
            record.rag_file_id = Some(rag_file_id.clone());
        }
        record.updated_at = Utc::now();
        Ok(())
    }
}
