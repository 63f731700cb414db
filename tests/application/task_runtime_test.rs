use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rag_ingest::application::ports::{QueueInspector, TaskBroker};
use rag_ingest::application::services::{
    MetricsCollector, QueueWeights, RetryPolicy, RuntimeConfig, RuntimeError, TaskError,
    TaskHandler, TaskMiddleware, TaskWorkerRuntime,
};
use rag_ingest::domain::{DEFAULT_QUEUE, LOW_QUEUE, TaskDelivery, TaskMessage};
use rag_ingest::infrastructure::queue::InMemoryTaskBroker;

use crate::helpers::{Behavior, ScriptedHandler, eventually};

const TASK_TYPE: &str = "test:task";

struct NoDelay;

impl RetryPolicy for NoDelay {
    fn retry_delay(&self, _retried: u32, _error: &TaskError, _task: &TaskMessage) -> Duration {
        Duration::ZERO
    }
}

fn config(concurrency: usize) -> RuntimeConfig {
    RuntimeConfig {
        concurrency,
        queues: QueueWeights::default(),
        idle_poll_interval: Duration::from_millis(20),
    }
}

fn runtime_with(
    broker: &Arc<InMemoryTaskBroker>,
    concurrency: usize,
) -> (TaskWorkerRuntime, Arc<MetricsCollector>) {
    let metrics = Arc::new(MetricsCollector::new(
        broker.clone(),
        vec![DEFAULT_QUEUE.to_string(), LOW_QUEUE.to_string()],
    ));
    let runtime = TaskWorkerRuntime::new(config(concurrency), broker.clone(), metrics.clone())
        .with_retry_policy(Arc::new(NoDelay));
    (runtime, metrics)
}

async fn archived_count(broker: &InMemoryTaskBroker) -> u64 {
    broker.queue_info(DEFAULT_QUEUE).await.unwrap().archived
}

#[test]
fn given_empty_task_type_when_registering_then_rejected() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 1);

    let result = runtime.register_handler("  ", Arc::new(ScriptedHandler::new(Behavior::Succeed)));

    assert!(matches!(result, Err(RuntimeError::EmptyTaskType)));
}

#[test]
fn given_registered_type_when_registering_again_then_duplicate_rejected() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 1);
    runtime
        .register_handler(TASK_TYPE, Arc::new(ScriptedHandler::new(Behavior::Succeed)))
        .unwrap();

    let result =
        runtime.register_handler(TASK_TYPE, Arc::new(ScriptedHandler::new(Behavior::Succeed)));

    assert!(matches!(result, Err(RuntimeError::DuplicateHandler(t)) if t == TASK_TYPE));
}

#[tokio::test]
async fn given_started_runtime_when_registering_or_starting_again_then_rejected() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 1);
    runtime.start().unwrap();

    let register =
        runtime.register_handler(TASK_TYPE, Arc::new(ScriptedHandler::new(Behavior::Succeed)));
    let start = runtime.start();

    assert!(matches!(register, Err(RuntimeError::AlreadyStarted)));
    assert!(matches!(start, Err(RuntimeError::AlreadyStarted)));
    runtime.shutdown().await;
    assert!(!runtime.is_running());
}

#[tokio::test]
async fn given_zero_concurrency_when_starting_then_invalid_config() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 0);

    assert!(matches!(runtime.start(), Err(RuntimeError::InvalidConfig(_))));
}

#[tokio::test]
async fn given_successful_handler_when_task_enqueued_then_task_is_acked() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 2);
    let handler = Arc::new(ScriptedHandler::new(Behavior::Succeed));
    runtime.register_handler(TASK_TYPE, handler.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new(TASK_TYPE, b"{}".to_vec()))
        .await
        .unwrap();

    assert!(eventually(200, || async { handler.completed() == 1 }).await);
    runtime.shutdown().await;
    let info = broker.queue_info(DEFAULT_QUEUE).await.unwrap();
    assert_eq!(info.pending + info.active + info.retry + info.archived, 0);
}

#[tokio::test]
async fn given_failing_handler_when_retries_exhausted_then_task_archived_and_callback_invoked() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let archived = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = archived.clone();
    let (runtime, _) = runtime_with(&broker, 1);
    let mut runtime = runtime.on_error(Arc::new(move |task: &TaskDelivery, error: &TaskError| {
        seen.lock()
            .unwrap()
            .push(format!("{}:{}:{}", task.task_type(), task.retried, error));
    }));
    let handler = Arc::new(ScriptedHandler::new(Behavior::Fail));
    runtime.register_handler(TASK_TYPE, handler.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new(TASK_TYPE, vec![]).with_max_retries(2))
        .await
        .unwrap();

    assert!(eventually(300, || async { archived_count(&broker).await == 1 }).await);
    runtime.shutdown().await;
    assert_eq!(handler.calls(), 3);
    assert_eq!(
        archived.lock().unwrap().clone(),
        vec![format!("{}:2:upstream unavailable", TASK_TYPE)]
    );
}

#[tokio::test]
async fn given_permanent_error_when_handler_fails_then_task_archived_without_retry() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 1);
    let handler = Arc::new(ScriptedHandler::new(Behavior::FailPermanently));
    runtime.register_handler(TASK_TYPE, handler.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new(TASK_TYPE, vec![]).with_max_retries(5))
        .await
        .unwrap();

    assert!(eventually(200, || async { archived_count(&broker).await == 1 }).await);
    runtime.shutdown().await;
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn given_unknown_task_type_when_dequeued_then_archived_immediately() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, metrics) = runtime_with(&broker, 1);
    runtime
        .register_handler(TASK_TYPE, Arc::new(ScriptedHandler::new(Behavior::Succeed)))
        .unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new("other:task", vec![]))
        .await
        .unwrap();

    assert!(eventually(200, || async { archived_count(&broker).await == 1 }).await);
    runtime.shutdown().await;
    let archived = broker.archived(DEFAULT_QUEUE).await;
    assert!(archived[0].error.contains("other:task"));
    assert_eq!(archived[0].delivery.retried, 0);
    let failures = metrics.task_metrics("other:task").unwrap();
    assert_eq!(failures.failure_count, 1);
    assert_eq!(failures.success_count, 0);
}

#[tokio::test]
async fn given_panicking_handler_when_processing_then_worker_survives_and_failure_is_recorded() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, metrics) = runtime_with(&broker, 1);
    let panicking = Arc::new(ScriptedHandler::new(Behavior::Panic));
    let healthy = Arc::new(ScriptedHandler::new(Behavior::Succeed));
    runtime.register_handler(TASK_TYPE, panicking.clone()).unwrap();
    runtime.register_handler("test:ok", healthy.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new(TASK_TYPE, vec![]).with_max_retries(0))
        .await
        .unwrap();
    assert!(eventually(200, || async { archived_count(&broker).await == 1 }).await);

    broker
        .enqueue(TaskMessage::new("test:ok", vec![]))
        .await
        .unwrap();
    assert!(eventually(200, || async { healthy.completed() == 1 }).await);
    runtime.shutdown().await;

    let archived = broker.archived(DEFAULT_QUEUE).await;
    assert!(archived[0].error.contains("handler exploded"));
    assert_eq!(metrics.task_metrics(TASK_TYPE).unwrap().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn given_slow_handler_when_timeout_elapses_then_task_fails_with_timeout() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, metrics) = runtime_with(&broker, 1);
    let handler = Arc::new(ScriptedHandler::new(Behavior::Sleep(Duration::from_secs(600))));
    runtime.register_handler(TASK_TYPE, handler.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(
            TaskMessage::new(TASK_TYPE, vec![])
                .with_max_retries(0)
                .with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert!(eventually(1000, || async { archived_count(&broker).await == 1 }).await);
    runtime.shutdown().await;
    assert_eq!(handler.completed(), 0);
    assert!(broker.archived(DEFAULT_QUEUE).await[0].error.contains("timed out"));
    assert_eq!(metrics.task_metrics(TASK_TYPE).unwrap().failure_count, 1);
}

/// Records the outcome each wrapped run reports back through the chain.
#[derive(Default)]
struct OutcomeRecorder {
    outcomes: Arc<Mutex<Vec<String>>>,
}

struct Recorded {
    next: Arc<dyn TaskHandler>,
    outcomes: Arc<Mutex<Vec<String>>>,
}

impl TaskMiddleware for OutcomeRecorder {
    fn wrap(&self, next: Arc<dyn TaskHandler>) -> Arc<dyn TaskHandler> {
        Arc::new(Recorded {
            next,
            outcomes: self.outcomes.clone(),
        })
    }
}

#[async_trait]
impl TaskHandler for Recorded {
    async fn process(&self, task: &TaskDelivery) -> Result<(), TaskError> {
        let result = self.next.process(task).await;
        let outcome = match &result {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        self.outcomes.lock().unwrap().push(outcome);
        result
    }
}

#[tokio::test(start_paused = true)]
async fn given_slow_handler_when_timeout_elapses_then_middleware_sees_the_timeout() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let recorder = OutcomeRecorder::default();
    let outcomes = recorder.outcomes.clone();
    let (runtime, _) = runtime_with(&broker, 1);
    let mut runtime = runtime.with_middleware(Arc::new(recorder));
    let handler = Arc::new(ScriptedHandler::new(Behavior::Sleep(Duration::from_secs(600))));
    runtime.register_handler(TASK_TYPE, handler).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(
            TaskMessage::new(TASK_TYPE, vec![])
                .with_max_retries(0)
                .with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert!(eventually(1000, || async { archived_count(&broker).await == 1 }).await);
    runtime.shutdown().await;
    let outcomes = outcomes.lock().unwrap().clone();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn given_failure_with_default_backoff_when_retried_then_task_waits_in_retry_state() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let metrics = Arc::new(MetricsCollector::new(broker.clone(), vec![]));
    let mut runtime = TaskWorkerRuntime::new(config(1), broker.clone(), metrics);
    let handler = Arc::new(ScriptedHandler::new(Behavior::Fail));
    runtime.register_handler(TASK_TYPE, handler.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new(TASK_TYPE, vec![]))
        .await
        .unwrap();

    assert!(eventually(200, || async { handler.calls() == 1 }).await);
    tokio::time::sleep(Duration::from_secs(30)).await;
    let info = broker.queue_info(DEFAULT_QUEUE).await.unwrap();
    assert_eq!(info.retry, 1);
    assert_eq!(handler.calls(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(eventually(200, || async { handler.calls() == 2 }).await);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn given_task_in_flight_when_shutting_down_then_task_completes_before_return() {
    let broker = Arc::new(InMemoryTaskBroker::new());
    let (mut runtime, _) = runtime_with(&broker, 1);
    let handler = Arc::new(ScriptedHandler::new(Behavior::Sleep(Duration::from_secs(2))));
    runtime.register_handler(TASK_TYPE, handler.clone()).unwrap();
    runtime.start().unwrap();

    broker
        .enqueue(TaskMessage::new(TASK_TYPE, vec![]))
        .await
        .unwrap();
    assert!(eventually(200, || async { handler.calls() == 1 }).await);

    runtime.shutdown().await;

    assert_eq!(handler.completed(), 1);
    assert_eq!(broker.queue_info(DEFAULT_QUEUE).await.unwrap().active, 0);
}

#[test]
fn given_default_weights_when_cycling_ticks_then_each_queue_leads_in_proportion() {
    let weights = QueueWeights::default();

    let leads: Vec<&str> = (0..9).map(|tick| weights.order(tick)[0]).collect();

    assert_eq!(leads.iter().filter(|q| **q == DEFAULT_QUEUE).count(), 6);
    assert_eq!(leads.iter().filter(|q| **q == LOW_QUEUE).count(), 3);
    assert_eq!(weights.order(8), vec![LOW_QUEUE, DEFAULT_QUEUE]);
}

#[test]
fn given_zero_weight_queue_when_building_weights_then_queue_is_dropped() {
    let weights = QueueWeights::new(vec![("critical".to_string(), 0), ("default".to_string(), 1)]);

    assert_eq!(weights.queue_names(), vec!["default".to_string()]);
}
