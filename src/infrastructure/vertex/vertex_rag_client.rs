use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::application::ports::{CorpusClient, CorpusClientError};
use crate::domain::{ImportResponse, OperationHandle, OperationStatus};

const API_VERSION: &str = "v1beta1";

/// Vertex AI RAG Engine over its REST API.
pub struct VertexRagClient {
    client: Client,
    base_url: String,
    project_id: String,
    location: String,
    access_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportRagFilesRequest {
    import_rag_files_config: ImportRagFilesConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportRagFilesConfig {
    gcs_source: GcsSource,
}

#[derive(Serialize)]
struct GcsSource {
    uris: Vec<String>,
}

#[derive(Deserialize)]
struct OperationResource {
    #[serde(default)]
    name: Option<String>,
}

impl VertexRagClient {
    pub fn new(
        base_url: &str,
        project_id: &str,
        location: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CorpusClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CorpusClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            location: location.to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Accepts either a full `projects/.../ragCorpora/{id}` resource or a bare corpus id.
    pub fn corpus_resource(&self, corpus_name: &str) -> String {
        let corpus_name = corpus_name.trim_matches('/');
        if corpus_name.starts_with("projects/") {
            corpus_name.to_string()
        } else {
            format!(
                "projects/{}/locations/{}/ragCorpora/{}",
                self.project_id, self.location, corpus_name
            )
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, resource)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn check_status(response: Response) -> Result<Response, CorpusClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CorpusClientError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CorpusClient for VertexRagClient {
    #[instrument(skip(self), fields(corpus = %corpus_name))]
    async fn add_document_to_corpus(
        &self,
        corpus_name: &str,
        source_uri: &str,
    ) -> Result<ImportResponse, CorpusClientError> {
        let url = self.url(&format!(
            "{}/ragFiles:import",
            self.corpus_resource(corpus_name)
        ));
        let body = ImportRagFilesRequest {
            import_rag_files_config: ImportRagFilesConfig {
                gcs_source: GcsSource {
                    uris: vec![source_uri.to_string()],
                },
            },
        };

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CorpusClientError::RequestFailed(e.to_string()))?;
        let response = check_status(response).await?;

        let operation: OperationResource = response
            .json()
            .await
            .map_err(|e| CorpusClientError::InvalidResponse(e.to_string()))?;

        let operation = operation
            .name
            .filter(|name| !name.trim().is_empty())
            .map(OperationHandle::new);
        tracing::debug!(operation = ?operation, "Import operation started");

        Ok(ImportResponse { operation })
    }

    #[instrument(skip(self), fields(operation = %operation))]
    async fn check_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> Result<OperationStatus, CorpusClientError> {
        let url = self.url(operation.as_str().trim_matches('/'));

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CorpusClientError::RequestFailed(e.to_string()))?;
        let response = check_status(response).await?;

        response
            .json::<OperationStatus>()
            .await
            .map_err(|e| CorpusClientError::InvalidResponse(e.to_string()))
    }
}
