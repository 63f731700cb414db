use async_trait::async_trait;

use crate::domain::{ImportResponse, OperationHandle, OperationStatus};

/// Remote ingestion service that imports documents into a retrieval corpus.
#[async_trait]
pub trait CorpusClient: Send + Sync {
    async fn add_document_to_corpus(
        &self,
        corpus_name: &str,
        source_uri: &str,
    ) -> Result<ImportResponse, CorpusClientError>;

    async fn check_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> Result<OperationStatus, CorpusClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusClientError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
