use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentStatus, FileId};

/// Per-file ingestion state as kept by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub file_id: FileId,
    pub status: DocumentStatus,
    pub error_msg: Option<String>,
    pub gcs_object: Option<String>,
    pub rag_file_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn pending(file_id: FileId) -> Self {
        Self {
            file_id,
            status: DocumentStatus::Pending,
            error_msg: None,
            gcs_object: None,
            rag_file_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFieldsUpdate {
    pub gcs_object: Option<String>,
    pub rag_file_id: Option<String>,
}

impl DocumentFieldsUpdate {
    pub fn gcs_object(name: impl Into<String>) -> Self {
        Self {
            gcs_object: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn rag_file_id(id: impl Into<String>) -> Self {
        Self {
            rag_file_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gcs_object.is_none() && self.rag_file_id.is_none()
    }
}
