use std::sync::Arc;

use async_trait::async_trait;

use super::{CorpusClient, ObjectStorage};

/// Collaborator clients used by one ingestion run.
#[derive(Clone)]
pub struct IngestionClients {
    pub storage: Arc<dyn ObjectStorage>,
    pub corpus: Arc<dyn CorpusClient>,
}

/// Builds the object store and ingestion service clients for a task.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self) -> Result<IngestionClients, ClientInitError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientInitError {
    #[error("object storage client: {0}")]
    Storage(String),
    #[error("corpus client: {0}")]
    Corpus(String),
}
