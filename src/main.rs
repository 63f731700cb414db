use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use rag_ingest::application::ports::{DocumentRepository, QueueInspector, TaskBroker};
use rag_ingest::application::services::{
    DocumentIngestionHandler, ExponentialBackoff, MetricsCollector, OperationPoller,
    TaskWorkerRuntime,
};
use rag_ingest::domain::ADD_DOCUMENT_TASK;
use rag_ingest::infrastructure::clients::SettingsClientFactory;
use rag_ingest::infrastructure::observability::{TracingConfig, init_tracing};
use rag_ingest::infrastructure::persistence::{
    InMemoryDocumentRepository, PgDocumentRepository, create_pool, run_migrations,
};
use rag_ingest::infrastructure::queue::{InMemoryTaskBroker, PgTaskBroker};
use rag_ingest::presentation::{AppState, Environment, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment).context("Failed to load settings")?;

    init_tracing(&TracingConfig::new(
        environment.as_str(),
        &settings.logging.level,
        settings.logging.enable_json,
    ));

    let (broker, inspector, documents): (
        Arc<dyn TaskBroker>,
        Arc<dyn QueueInspector>,
        Arc<dyn DocumentRepository>,
    ) = match settings.database.url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let pool = create_pool(url, settings.database.max_connections).await?;
            run_migrations(&pool).await?;
            let broker = Arc::new(PgTaskBroker::new(pool.clone()));
            (
                broker.clone(),
                broker,
                Arc::new(PgDocumentRepository::new(pool)),
            )
        }
        None => {
            tracing::warn!("No database configured, using in-memory broker and document store");
            let broker = Arc::new(InMemoryTaskBroker::new());
            (
                broker.clone(),
                broker,
                Arc::new(InMemoryDocumentRepository::new()),
            )
        }
    };

    let runtime_config = settings.worker.runtime_config();
    let metrics = Arc::new(
        MetricsCollector::new(inspector, runtime_config.queues.queue_names())
            .with_estimated_task_duration(settings.health.estimated_task_duration()),
    );
    metrics.spawn_queue_monitor(settings.health.monitor_interval());

    let handler = Arc::new(DocumentIngestionHandler::new(
        Arc::new(SettingsClientFactory::new(
            settings.storage.clone(),
            settings.vertex.clone(),
        )),
        documents,
        OperationPoller::new(settings.poller.poller_config()),
        Arc::clone(&metrics),
    ));

    let mut runtime = TaskWorkerRuntime::new(runtime_config, broker, Arc::clone(&metrics))
        .with_retry_policy(Arc::new(ExponentialBackoff::new(
            settings.worker.retry_delay_cap(),
        )));
    runtime.register_handler(ADD_DOCUMENT_TASK, handler)?;
    runtime.start()?;

    let router = create_router(AppState::new(
        Arc::clone(&metrics),
        settings.health.thresholds(),
    ));
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Health server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;
    metrics.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
