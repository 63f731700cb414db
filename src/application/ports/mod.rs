mod client_factory;
mod corpus_client;
mod document_repository;
mod object_storage;
mod repository_error;
mod task_broker;

pub use client_factory::{ClientFactory, ClientInitError, IngestionClients};
pub use corpus_client::{CorpusClient, CorpusClientError};
pub use document_repository::DocumentRepository;
pub use object_storage::{ObjectStorage, ObjectStorageError};
pub use repository_error::RepositoryError;
pub use task_broker::{BrokerError, QueueInfo, QueueInspector, TaskBroker};
