use async_trait::async_trait;

use crate::domain::{DocumentFieldsUpdate, DocumentRecord, DocumentStatus, FileId};

use super::RepositoryError;

/// Per-document status store. Writes are plain overwrites with no locking.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create(&self, record: &DocumentRecord) -> Result<(), RepositoryError>;

    async fn get(&self, file_id: &FileId) -> Result<Option<DocumentRecord>, RepositoryError>;

    async fn update_status(
        &self,
        file_id: &FileId,
        status: DocumentStatus,
        error_msg: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn update_fields(
        &self,
        file_id: &FileId,
        update: &DocumentFieldsUpdate,
    ) -> Result<(), RepositoryError>;
}
