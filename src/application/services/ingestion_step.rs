use std::fmt;

use crate::application::ports::{ClientInitError, CorpusClientError, RepositoryError};
use crate::domain::OperationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestionStage {
    Enqueued,
    ServicesInit,
    RagImporting,
    RagOperationPolling,
    FileIdExtraction,
    GcsRename,
    DbFinalize,
    Completed,
    Failed,
}

impl IngestionStage {
    /// Stages run in order once the payload has been decoded.
    pub const PIPELINE: [IngestionStage; 6] = [
        IngestionStage::ServicesInit,
        IngestionStage::RagImporting,
        IngestionStage::RagOperationPolling,
        IngestionStage::FileIdExtraction,
        IngestionStage::GcsRename,
        IngestionStage::DbFinalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStage::Enqueued => "enqueued",
            IngestionStage::ServicesInit => "services_init",
            IngestionStage::RagImporting => "rag_importing",
            IngestionStage::RagOperationPolling => "rag_operation_polling",
            IngestionStage::FileIdExtraction => "file_id_extraction",
            IngestionStage::GcsRename => "gcs_rename",
            IngestionStage::DbFinalize => "db_finalize",
            IngestionStage::Completed => "completed",
            IngestionStage::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compensating action taken after a fatal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    None,
    DeleteTempObject,
}

#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    /// The step degraded but the task still succeeds.
    WarnAndContinue(String),
    FailFast {
        error: IngestionError,
        cleanup: Cleanup,
    },
}

impl StepOutcome {
    pub fn fail(error: IngestionError, cleanup: Cleanup) -> Self {
        StepOutcome::FailFast { error, cleanup }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("client initialization: {0}")]
    DependencyInit(ClientInitError),
    #[error("add document to corpus: {0}")]
    RemoteCall(CorpusClientError),
    #[error("import operation failed: {0}")]
    OperationFailure(OperationError),
    #[error("rag file id extraction: {0}")]
    Extraction(String),
    #[error("document store: {0}")]
    Persistence(RepositoryError),
}

impl IngestionError {
    /// Malformed payloads fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IngestionError::Validation(_))
    }
}

