use std::sync::Arc;

use rag_ingest::application::ports::{ClientFactory, ClientInitError, IngestionClients, ObjectStorage};
use rag_ingest::domain::ObjectName;
use rag_ingest::infrastructure::clients::{SettingsClientFactory, StaticClientFactory};
use rag_ingest::presentation::config::{StorageSettings, VertexSettings};

use crate::helpers::{FakeCorpusClient, FakeStorage};

fn vertex(project_id: &str) -> VertexSettings {
    VertexSettings {
        endpoint: Some("http://127.0.0.1:9".to_string()),
        project_id: project_id.to_string(),
        ..VertexSettings::default()
    }
}

#[tokio::test]
async fn given_missing_project_when_creating_clients_then_corpus_init_error() {
    let factory = SettingsClientFactory::new(StorageSettings::default(), vertex(" "));

    let result = factory.create().await;

    assert!(matches!(result, Err(ClientInitError::Corpus(_))));
}

#[tokio::test]
async fn given_valid_settings_when_creating_twice_then_clients_are_shared() {
    let factory = SettingsClientFactory::new(StorageSettings::default(), vertex("p1"));

    let first = factory.create().await.unwrap();
    let second = factory.create().await.unwrap();

    assert!(Arc::ptr_eq(&first.storage, &second.storage));
    assert!(Arc::ptr_eq(&first.corpus, &second.corpus));
    assert_eq!(
        first.storage.object_uri(&ObjectName::new("temp/a.pdf")),
        "memory:///temp/a.pdf"
    );
}

#[tokio::test]
async fn given_prebuilt_clients_when_creating_then_same_clients_returned() {
    let storage = Arc::new(FakeStorage::default());
    let factory = StaticClientFactory::new(IngestionClients {
        storage: storage.clone(),
        corpus: Arc::new(FakeCorpusClient::without_operation()),
    });

    let clients = factory.create().await.unwrap();

    assert_eq!(
        clients.storage.object_uri(&ObjectName::new("a")),
        storage.object_uri(&ObjectName::new("a"))
    );
}
