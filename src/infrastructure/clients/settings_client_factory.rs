use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::application::ports::{ClientFactory, ClientInitError, IngestionClients};
use crate::infrastructure::storage::ObjectStorageFactory;
use crate::infrastructure::vertex::VertexRagClient;
use crate::presentation::config::{StorageSettings, VertexSettings};

/// Builds clients from settings on first use and shares them afterwards.
/// A failed build is retried by the next task.
pub struct SettingsClientFactory {
    storage: StorageSettings,
    vertex: VertexSettings,
    clients: OnceCell<IngestionClients>,
}

impl SettingsClientFactory {
    pub fn new(storage: StorageSettings, vertex: VertexSettings) -> Self {
        Self {
            storage,
            vertex,
            clients: OnceCell::new(),
        }
    }

    fn build(&self) -> Result<IngestionClients, ClientInitError> {
        let storage = ObjectStorageFactory::create(&self.storage)
            .map_err(|e| ClientInitError::Storage(e.to_string()))?;

        if self.vertex.project_id.trim().is_empty() {
            return Err(ClientInitError::Corpus(
                "vertex.project_id is required".to_string(),
            ));
        }
        let corpus = VertexRagClient::new(
            &self.vertex.base_url(),
            &self.vertex.project_id,
            &self.vertex.location,
            self.vertex.access_token.clone(),
            Duration::from_secs(self.vertex.request_timeout_secs),
        )
        .map_err(|e| ClientInitError::Corpus(e.to_string()))?;

        tracing::info!(
            project_id = %self.vertex.project_id,
            location = %self.vertex.location,
            "Ingestion clients initialized"
        );
        Ok(IngestionClients {
            storage,
            corpus: Arc::new(corpus),
        })
    }
}

#[async_trait]
impl ClientFactory for SettingsClientFactory {
    async fn create(&self) -> Result<IngestionClients, ClientInitError> {
        self.clients
            .get_or_try_init(|| async { self.build() })
            .await
            .cloned()
    }
}

/// Hands out the same prebuilt clients every time.
#[derive(Clone)]
pub struct StaticClientFactory {
    clients: IngestionClients,
}

impl StaticClientFactory {
    pub fn new(clients: IngestionClients) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    async fn create(&self) -> Result<IngestionClients, ClientInitError> {
        Ok(self.clients.clone())
    }
}
