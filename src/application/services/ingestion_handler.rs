use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::Instrument;

use crate::application::ports::{
    ClientFactory, ClientInitError, DocumentRepository, IngestionClients,
};
use crate::domain::{
    ADD_DOCUMENT_TASK, AddDocumentPayload, DocumentFieldsUpdate, DocumentStatus, FileId,
    ObjectName, OperationHandle, TaskDelivery, extract_rag_file_id,
};

use super::{
    Cleanup, IngestionError, IngestionStage, MetricsCollector, OperationPoller, PollOutcome,
    StepOutcome, TaskError, TaskHandler,
};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub file_id: FileId,
    /// Absent when polling was abandoned before the operation finished.
    pub rag_file_id: Option<String>,
    /// Object name recorded as authoritative: the final name, or the temp name if the rename failed.
    pub stored_object: ObjectName,
    pub warnings: Vec<String>,
}

struct IngestionContext {
    payload: AddDocumentPayload,
    clients: Option<IngestionClients>,
    operation: Option<OperationHandle>,
    poll_outcome: Option<PollOutcome>,
    rag_file_id: Option<String>,
    stored_object: ObjectName,
    warnings: Vec<String>,
}

impl IngestionContext {
    fn new(payload: AddDocumentPayload) -> Self {
        let stored_object = payload.temp_object_name.clone();
        Self {
            payload,
            clients: None,
            operation: None,
            poll_outcome: None,
            rag_file_id: None,
            stored_object,
            warnings: Vec::new(),
        }
    }

    fn clients(&self) -> Result<IngestionClients, IngestionError> {
        self.clients.clone().ok_or_else(|| {
            IngestionError::DependencyInit(ClientInitError::Storage(
                "clients used before initialization".to_string(),
            ))
        })
    }

    fn into_report(self) -> IngestionReport {
        IngestionReport {
            file_id: self.payload.file_id,
            rag_file_id: self.rag_file_id,
            stored_object: self.stored_object,
            warnings: self.warnings,
        }
    }
}

/// Imports an uploaded file into a corpus: import, wait for the remote
/// operation, record the corpus file id, move the object to its final name
/// and mark the document completed. Fatal steps mark the document failed and
/// may delete the temp object; non-fatal steps only log.
pub struct DocumentIngestionHandler {
    client_factory: Arc<dyn ClientFactory>,
    document_repository: Arc<dyn DocumentRepository>,
    poller: OperationPoller,
    metrics: Arc<MetricsCollector>,
}

impl DocumentIngestionHandler {
    pub fn new(
        client_factory: Arc<dyn ClientFactory>,
        document_repository: Arc<dyn DocumentRepository>,
        poller: OperationPoller,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            client_factory,
            document_repository,
            poller,
            metrics,
        }
    }

    /// Runs the whole sequence for one payload and reports the outcome to the metrics collector.
    pub async fn ingest(&self, payload: &[u8]) -> Result<IngestionReport, IngestionError> {
        let started = Instant::now();
        let result = self.run(payload).await;

        match &result {
            Ok(_) => self
                .metrics
                .record_task_success(ADD_DOCUMENT_TASK, started.elapsed()),
            Err(_) => self
                .metrics
                .record_task_failure(ADD_DOCUMENT_TASK, started.elapsed()),
        }
        result
    }

    async fn run(&self, payload: &[u8]) -> Result<IngestionReport, IngestionError> {
        let payload = self.decode(payload).await?;
        let span = tracing::info_span!(
            "document_ingestion",
            file_id = %payload.file_id,
            corpus = %payload.corpus_name,
            display_name = %payload.display_name,
        );
        self.run_pipeline(payload).instrument(span).await
    }

    async fn decode(&self, payload: &[u8]) -> Result<AddDocumentPayload, IngestionError> {
        let payload: AddDocumentPayload = serde_json::from_slice(payload)
            .map_err(|e| IngestionError::Validation(e.to_string()))?;

        let missing = payload.missing_fields();
        if !missing.is_empty() {
            let error = IngestionError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            ));
            if !payload.file_id.is_empty() {
                self.mark_failed(&payload.file_id, &error).await;
            }
            return Err(error);
        }
        Ok(payload)
    }

    async fn run_pipeline(
        &self,
        payload: AddDocumentPayload,
    ) -> Result<IngestionReport, IngestionError> {
        let mut ctx = IngestionContext::new(payload);

        for stage in IngestionStage::PIPELINE {
            tracing::debug!(stage = %stage, "Ingestion stage started");
            match self.run_step(stage, &mut ctx).await {
                StepOutcome::Continue => {}
                StepOutcome::WarnAndContinue(warning) => {
                    tracing::warn!(stage = %stage, warning = %warning, "Ingestion stage degraded");
                    ctx.warnings.push(warning);
                }
                StepOutcome::FailFast { error, cleanup } => {
                    self.fail(&ctx, stage, &error, cleanup).await;
                    return Err(error);
                }
            }
        }

        tracing::info!(
            stage = %IngestionStage::Completed,
            rag_file_id = ctx.rag_file_id.as_deref().unwrap_or(""),
            stored_object = %ctx.stored_object,
            warnings = ctx.warnings.len(),
            "Document ingestion completed"
        );
        Ok(ctx.into_report())
    }

    async fn run_step(&self, stage: IngestionStage, ctx: &mut IngestionContext) -> StepOutcome {
        match stage {
            IngestionStage::ServicesInit => self.init_services(ctx).await,
            IngestionStage::RagImporting => self.import_document(ctx).await,
            IngestionStage::RagOperationPolling => self.poll_operation(ctx).await,
            IngestionStage::FileIdExtraction => self.extract_file_id(ctx).await,
            IngestionStage::GcsRename => self.rename_object(ctx).await,
            IngestionStage::DbFinalize => self.finalize(ctx).await,
            IngestionStage::Enqueued | IngestionStage::Completed | IngestionStage::Failed => {
                StepOutcome::Continue
            }
        }
    }

    async fn init_services(&self, ctx: &mut IngestionContext) -> StepOutcome {
        match self.client_factory.create().await {
            Ok(clients) => {
                ctx.clients = Some(clients);
                StepOutcome::Continue
            }
            // Nothing has been touched yet, so there is nothing to clean up.
            Err(e) => StepOutcome::fail(IngestionError::DependencyInit(e), Cleanup::None),
        }
    }

    async fn import_document(&self, ctx: &mut IngestionContext) -> StepOutcome {
        let clients = match ctx.clients() {
            Ok(clients) => clients,
            Err(e) => return StepOutcome::fail(e, Cleanup::None),
        };
        let source_uri = clients.storage.object_uri(&ctx.payload.temp_object_name);

        match clients
            .corpus
            .add_document_to_corpus(&ctx.payload.corpus_name, &source_uri)
            .await
        {
            Ok(response) => {
                tracing::info!(
                    source_uri = %source_uri,
                    operation = ?response.operation.as_ref().map(OperationHandle::as_str),
                    "Import requested"
                );
                ctx.operation = response.operation;
                StepOutcome::Continue
            }
            Err(e) => StepOutcome::fail(IngestionError::RemoteCall(e), Cleanup::DeleteTempObject),
        }
    }

    async fn poll_operation(&self, ctx: &mut IngestionContext) -> StepOutcome {
        let Some(operation) = ctx.operation.clone() else {
            return StepOutcome::Continue;
        };
        let clients = match ctx.clients() {
            Ok(clients) => clients,
            Err(e) => return StepOutcome::fail(e, Cleanup::None),
        };

        match self.poller.poll(clients.corpus.as_ref(), &operation).await {
            Ok(PollOutcome::Failed(error)) => StepOutcome::fail(
                IngestionError::OperationFailure(error),
                Cleanup::DeleteTempObject,
            ),
            Ok(PollOutcome::TimedOut { waited, .. }) => StepOutcome::WarnAndContinue(format!(
                "operation {} still running after {}s, polling abandoned",
                operation,
                waited.as_secs()
            )),
            Ok(outcome) => {
                ctx.poll_outcome = Some(outcome);
                StepOutcome::Continue
            }
            // The operation may still finish remotely.
            Err(e) => StepOutcome::WarnAndContinue(format!("polling abandoned: {}", e)),
        }
    }

    async fn extract_file_id(&self, ctx: &mut IngestionContext) -> StepOutcome {
        let response = match (&ctx.operation, &ctx.poll_outcome) {
            (None, _) => {
                return StepOutcome::fail(
                    IngestionError::Extraction("import returned no operation handle".to_string()),
                    Cleanup::DeleteTempObject,
                );
            }
            (Some(_), Some(PollOutcome::Succeeded(response))) => response,
            (Some(operation), _) => {
                tracing::info!(
                    operation = %operation,
                    "Operation result unknown, skipping rag file id"
                );
                return StepOutcome::Continue;
            }
        };

        // A finished import without a usable id is as bad as a failed one.
        let Some(rag_file_id) = extract_rag_file_id(response) else {
            return StepOutcome::fail(
                IngestionError::Extraction(
                    "operation response has no ragFiles[0].name".to_string(),
                ),
                Cleanup::DeleteTempObject,
            );
        };

        if let Err(e) = self
            .document_repository
            .update_fields(
                &ctx.payload.file_id,
                &DocumentFieldsUpdate::rag_file_id(rag_file_id.clone()),
            )
            .await
        {
            return StepOutcome::fail(IngestionError::Persistence(e), Cleanup::None);
        }

        tracing::info!(rag_file_id = %rag_file_id, "Rag file id recorded");
        ctx.rag_file_id = Some(rag_file_id);
        StepOutcome::Continue
    }

    async fn rename_object(&self, ctx: &mut IngestionContext) -> StepOutcome {
        let clients = match ctx.clients() {
            Ok(clients) => clients,
            Err(e) => return StepOutcome::fail(e, Cleanup::None),
        };
        let temp = &ctx.payload.temp_object_name;
        let target = &ctx.payload.final_object_name;
        let mut warnings = Vec::new();

        if temp == target {
            ctx.stored_object = target.clone();
        } else {
            match clients.storage.rename(temp, target).await {
                Ok(()) => ctx.stored_object = target.clone(),
                // A redelivered task finds the object already moved.
                Err(e) if matches!(clients.storage.exists(target).await, Ok(true)) => {
                    tracing::debug!(object = %target, error = %e, "Object already at final name");
                    ctx.stored_object = target.clone();
                }
                Err(e) => {
                    warnings.push(format!("rename {} -> {} failed: {}", temp, target, e));
                    ctx.stored_object = temp.clone();
                }
            }
        }

        if let Err(e) = self
            .document_repository
            .update_fields(
                &ctx.payload.file_id,
                &DocumentFieldsUpdate::gcs_object(ctx.stored_object.as_str()),
            )
            .await
        {
            warnings.push(format!("recording object name failed: {}", e));
        }

        if warnings.is_empty() {
            StepOutcome::Continue
        } else {
            StepOutcome::WarnAndContinue(warnings.join("; "))
        }
    }

    async fn finalize(&self, ctx: &mut IngestionContext) -> StepOutcome {
        match self
            .document_repository
            .update_status(&ctx.payload.file_id, DocumentStatus::Completed, None)
            .await
        {
            Ok(()) => StepOutcome::Continue,
            Err(e) => {
                StepOutcome::WarnAndContinue(format!("marking document completed failed: {}", e))
            }
        }
    }

    async fn fail(
        &self,
        ctx: &IngestionContext,
        stage: IngestionStage,
        error: &IngestionError,
        cleanup: Cleanup,
    ) {
        tracing::error!(
            stage = %stage,
            next = %IngestionStage::Failed,
            error = %error,
            "Document ingestion failed"
        );
        self.mark_failed(&ctx.payload.file_id, error).await;

        if cleanup == Cleanup::DeleteTempObject {
            self.delete_temp_object(ctx).await;
        }
    }

    async fn mark_failed(&self, file_id: &FileId, error: &IngestionError) {
        let message = error.to_string();
        if let Err(e) = self
            .document_repository
            .update_status(file_id, DocumentStatus::Failed, Some(&message))
            .await
        {
            tracing::error!(file_id = %file_id, error = %e, "Failed to mark document as failed");
        }
    }

    async fn delete_temp_object(&self, ctx: &IngestionContext) {
        let Some(clients) = &ctx.clients else {
            return;
        };
        let temp = &ctx.payload.temp_object_name;
        match clients.storage.delete(temp).await {
            Ok(()) => tracing::info!(object = %temp, "Temporary object deleted"),
            Err(e) => tracing::warn!(
                object = %temp,
                error = %e,
                "Failed to delete temporary object after ingestion failure"
            ),
        }
    }
}

#[async_trait]
impl TaskHandler for DocumentIngestionHandler {
    async fn process(&self, task: &TaskDelivery) -> Result<(), TaskError> {
        match self.ingest(&task.message.payload).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => Err(TaskError::failed(e)),
            Err(e) => Err(TaskError::permanent(e)),
        }
    }
}
