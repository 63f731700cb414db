use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::application::ports::{DocumentRepository, RepositoryError};
use crate::domain::{DocumentFieldsUpdate, DocumentRecord, DocumentStatus, FileId};

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_failed(e: sqlx::Error) -> RepositoryError {
    RepositoryError::QueryFailed(e.to_string())
}

fn record_from_row(row: &PgRow) -> Result<DocumentRecord, RepositoryError> {
    let status: String = row.try_get("status").map_err(query_failed)?;
    let status = status
        .parse::<DocumentStatus>()
        .map_err(RepositoryError::QueryFailed)?;
    let file_id: String = row.try_get("file_id").map_err(query_failed)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(query_failed)?;

    Ok(DocumentRecord {
        file_id: FileId::new(file_id),
        status,
        error_msg: row.try_get("error_msg").map_err(query_failed)?,
        gcs_object: row.try_get("gcs_object").map_err(query_failed)?,
        rag_file_id: row.try_get("rag_file_id").map_err(query_failed)?,
        updated_at,
    })
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    #[instrument(skip(self, record), fields(file_id = %record.file_id))]
    async fn create(&self, record: &DocumentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO documents (file_id, status, error_msg, gcs_object, rag_file_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.file_id.as_str())
        .bind(record.status.as_str())
        .bind(record.error_msg.as_deref())
        .bind(record.gcs_object.as_deref())
        .bind(record.rag_file_id.as_deref())
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                RepositoryError::AlreadyExists(record.file_id.to_string())
            }
            _ => query_failed(e),
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn get(&self, file_id: &FileId) -> Result<Option<DocumentRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT file_id, status, error_msg, gcs_object, rag_file_id, updated_at
            FROM documents
            WHERE file_id = $1
            "#,
        )
        .bind(file_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self, error_msg), fields(file_id = %file_id, status = %status))]
    async fn update_status(
        &self,
        file_id: &FileId,
        status: DocumentStatus,
        error_msg: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status = $1, error_msg = $2, updated_at = $3
            WHERE file_id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(error_msg)
        .bind(Utc::now())
        .bind(file_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(file_id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, update), fields(file_id = %file_id))]
    async fn update_fields(
        &self,
        file_id: &FileId,
        update: &DocumentFieldsUpdate,
    ) -> Result<(), RepositoryError> {
        if update.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET gcs_object = COALESCE($1, gcs_object),
                rag_file_id = COALESCE($2, rag_file_id),
                updated_at = $3
            WHERE file_id = $4
            "#,
        )
        .bind(update.gcs_object.as_deref())
        .bind(update.rag_file_id.as_deref())
        .bind(Utc::now())
        .bind(file_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(file_id.to_string()));
        }
        Ok(())
    }
}
