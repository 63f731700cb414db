#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use rag_ingest::application::ports::{
    BrokerError, ClientFactory, ClientInitError, CorpusClient, CorpusClientError,
    DocumentRepository, IngestionClients, ObjectStorage, ObjectStorageError, QueueInfo,
    QueueInspector, RepositoryError,
};
use rag_ingest::application::services::{TaskError, TaskHandler};
use rag_ingest::domain::{
    DocumentFieldsUpdate, DocumentRecord, DocumentStatus, FileId, ImportResponse, ObjectName,
    OperationHandle, OperationStatus, TaskDelivery,
};
use rag_ingest::infrastructure::persistence::InMemoryDocumentRepository;

mod test_postgres;

pub use test_postgres::TestPostgres;

pub const TEST_BUCKET: &str = "test-bucket";

/// Bucket double keeping object names only.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
    fail_rename: bool,
    fail_delete: bool,
}

impl FakeStorage {
    pub fn with_objects(names: &[&str]) -> Self {
        let storage = Self::default();
        storage
            .objects
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        storage
    }

    pub fn failing_rename(mut self) -> Self {
        self.fail_rename = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains(name)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        _stream: BoxStream<'_, Result<Bytes, io::Error>>,
        name: &ObjectName,
        _content_type: &str,
    ) -> Result<(ObjectName, u64), ObjectStorageError> {
        self.objects.lock().unwrap().insert(name.to_string());
        Ok((name.clone(), 0))
    }

    async fn rename(&self, from: &ObjectName, to: &ObjectName) -> Result<(), ObjectStorageError> {
        if self.fail_rename {
            return Err(ObjectStorageError::RenameFailed("permission denied".to_string()));
        }
        let mut objects = self.objects.lock().unwrap();
        if !objects.remove(from.as_str()) {
            return Err(ObjectStorageError::NotFound(from.to_string()));
        }
        objects.insert(to.to_string());
        Ok(())
    }

    async fn delete(&self, name: &ObjectName) -> Result<(), ObjectStorageError> {
        if self.fail_delete {
            return Err(ObjectStorageError::DeleteFailed("bucket unavailable".to_string()));
        }
        self.objects.lock().unwrap().remove(name.as_str());
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn exists(&self, name: &ObjectName) -> Result<bool, ObjectStorageError> {
        Ok(self.contains(name.as_str()))
    }

    fn object_uri(&self, name: &ObjectName) -> String {
        format!("gs://{}/{}", TEST_BUCKET, name)
    }
}

/// Corpus service double. Status checks replay `statuses` in order and then
/// keep reporting a running operation.
#[derive(Default)]
pub struct FakeCorpusClient {
    import_error: Option<String>,
    operation: Option<String>,
    statuses: Mutex<VecDeque<Result<OperationStatus, String>>>,
    imports: Mutex<Vec<(String, String)>>,
    status_checks: AtomicUsize,
}

impl FakeCorpusClient {
    pub fn returning_operation(name: &str) -> Self {
        Self {
            operation: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn without_operation() -> Self {
        Self::default()
    }

    pub fn failing_import(message: &str) -> Self {
        Self {
            import_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn then_status(self, status: OperationStatus) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn then_status_error(self, message: &str) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn imports(&self) -> Vec<(String, String)> {
        self.imports.lock().unwrap().clone()
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorpusClient for FakeCorpusClient {
    async fn add_document_to_corpus(
        &self,
        corpus_name: &str,
        source_uri: &str,
    ) -> Result<ImportResponse, CorpusClientError> {
        self.imports
            .lock()
            .unwrap()
            .push((corpus_name.to_string(), source_uri.to_string()));

        if let Some(message) = &self.import_error {
            return Err(CorpusClientError::Api {
                status: 500,
                body: message.clone(),
            });
        }
        Ok(ImportResponse {
            operation: self.operation.clone().map(OperationHandle::new),
        })
    }

    async fn check_operation_status(
        &self,
        _operation: &OperationHandle,
    ) -> Result<OperationStatus, CorpusClientError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(CorpusClientError::RequestFailed(message)),
            None => Ok(OperationStatus::running()),
        }
    }
}

pub struct FakeClientFactory {
    clients: Option<IngestionClients>,
    creations: AtomicUsize,
}

impl FakeClientFactory {
    pub fn new(storage: Arc<FakeStorage>, corpus: Arc<FakeCorpusClient>) -> Self {
        Self {
            clients: Some(IngestionClients { storage, corpus }),
            creations: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            clients: None,
            creations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ClientFactory for FakeClientFactory {
    async fn create(&self) -> Result<IngestionClients, ClientInitError> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        self.clients
            .clone()
            .ok_or_else(|| ClientInitError::Corpus("credentials missing".to_string()))
    }
}

/// In-memory repository that can be told to reject selected writes.
#[derive(Default)]
pub struct FlakyDocumentRepository {
    inner: InMemoryDocumentRepository,
    reject_rag_file_id: bool,
    reject_gcs_object: bool,
    reject_completion: bool,
}

impl FlakyDocumentRepository {
    pub fn rejecting_rag_file_id() -> Self {
        Self {
            reject_rag_file_id: true,
            ..Self::default()
        }
    }

    pub fn rejecting_gcs_object() -> Self {
        Self {
            reject_gcs_object: true,
            ..Self::default()
        }
    }

    pub fn rejecting_completion() -> Self {
        Self {
            reject_completion: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl DocumentRepository for FlakyDocumentRepository {
    async fn create(&self, record: &DocumentRecord) -> Result<(), RepositoryError> {
        self.inner.create(record).await
    }

    async fn get(&self, file_id: &FileId) -> Result<Option<DocumentRecord>, RepositoryError> {
        self.inner.get(file_id).await
    }

    async fn update_status(
        &self,
        file_id: &FileId,
        status: DocumentStatus,
        error_msg: Option<&str>,
    ) -> Result<(), RepositoryError> {
        if self.reject_completion && status == DocumentStatus::Completed {
            return Err(RepositoryError::QueryFailed("connection reset".to_string()));
        }
        self.inner.update_status(file_id, status, error_msg).await
    }

    async fn update_fields(
        &self,
        file_id: &FileId,
        update: &DocumentFieldsUpdate,
    ) -> Result<(), RepositoryError> {
        if self.reject_rag_file_id && update.rag_file_id.is_some() {
            return Err(RepositoryError::QueryFailed("deadline exceeded".to_string()));
        }
        if self.reject_gcs_object && update.gcs_object.is_some() {
            return Err(RepositoryError::QueryFailed("deadline exceeded".to_string()));
        }
        self.inner.update_fields(file_id, update).await
    }
}

/// Queue inspector reporting fixed counts, or failing.
pub struct StaticQueueInspector {
    info: Mutex<Result<QueueInfo, String>>,
}

impl StaticQueueInspector {
    pub fn with_pending(pending: u64) -> Self {
        Self {
            info: Mutex::new(Ok(QueueInfo {
                pending,
                ..QueueInfo::default()
            })),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            info: Mutex::new(Err(message.to_string())),
        }
    }

    pub fn set_pending(&self, pending: u64) {
        *self.info.lock().unwrap() = Ok(QueueInfo {
            pending,
            ..QueueInfo::default()
        });
    }
}

#[async_trait]
impl QueueInspector for StaticQueueInspector {
    async fn queue_info(&self, _queue: &str) -> Result<QueueInfo, BrokerError> {
        self.info
            .lock()
            .unwrap()
            .clone()
            .map_err(BrokerError::ConnectionFailed)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    FailPermanently,
    Panic,
    Sleep(Duration),
}

/// Task handler with scripted behavior that counts its invocations.
pub struct ScriptedHandler {
    behavior: Behavior,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn process(&self, _task: &TaskDelivery) -> Result<(), TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail => return Err(TaskError::failed("upstream unavailable")),
            Behavior::FailPermanently => return Err(TaskError::permanent("malformed payload")),
            Behavior::Panic => panic!("handler exploded"),
            Behavior::Sleep(duration) => tokio::time::sleep(duration).await,
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Polls `condition` every 10ms for up to `attempts` rounds.
pub async fn eventually<F, Fut>(attempts: usize, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
