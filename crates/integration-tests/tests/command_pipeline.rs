//! Push queue drained by an external command
//!
//! A SQLite-backed coverage queue is worked by a `CommandHandler`; the exit
//! status of the command decides whether an item completes, is retried or is
//! dropped.
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use conduit_core::application::push::{builtin_descriptor, COVERAGE_QUEUE};
use conduit_core::application::worker::Step;
use conduit_core::application::{
    Disposition, ItemHandler, PushService, QueueRegistry, QueueWorker, ReadinessGate, WorkerConfig,
};
use conduit_core::domain::{CoverageItem, PersistenceMode, QueueName};
use conduit_core::port::time_provider::SystemTimeProvider;
use conduit_core::port::DurableQueue;
use conduit_infra_sqlite::{create_file_pool, run_migrations, SqliteQueueFactory};
use conduit_infra_system::{CommandHandler, CommandSpec, EXIT_TEMPFAIL};
use serde_json::Value;
use sqlx::SqlitePool;

/// Exits 75 for job "busy", 3 for job "bad", 0 otherwise
fn push_script() -> String {
    format!(
        r#"input=$(cat)
case "$input" in
  *'"job_id":"busy"'*) echo 'server busy' >&2; exit {tempfail} ;;
  *'"job_id":"bad"'*) echo 'report rejected' >&2; exit 3 ;;
  *) exit 0 ;;
esac"#,
        tempfail = EXIT_TEMPFAIL
    )
}

async fn open(path: &Path) -> (SqlitePool, Arc<QueueRegistry>, Arc<dyn DurableQueue>) {
    let pool = create_file_pool(path).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let registry = Arc::new(QueueRegistry::new(
        Arc::new(SqliteQueueFactory::new(pool.clone())),
        Arc::new(SystemTimeProvider),
    ));
    let queue = registry
        .open(builtin_descriptor(COVERAGE_QUEUE, PersistenceMode::Durable).unwrap())
        .await
        .unwrap();
    (pool, registry, queue)
}

fn coverage(job_id: &str) -> CoverageItem {
    CoverageItem {
        job_id: job_id.to_string(),
        build_id: "42".to_string(),
        report_file: "target/lcov.info".to_string(),
        report_type: "LCOV".to_string(),
    }
}

fn command_worker(queue: Arc<dyn DurableQueue>) -> QueueWorker<Value> {
    let spec = CommandSpec::new("sh", Duration::from_secs(10))
        .with_args(vec!["-c".to_string(), push_script()]);
    let handler: Arc<dyn ItemHandler<Value>> = Arc::new(CommandHandler::new(spec));
    QueueWorker::new(
        QueueName::new(COVERAGE_QUEUE).unwrap(),
        queue,
        Arc::new(ReadinessGate::always_open()),
        handler,
    )
    .with_config(WorkerConfig {
        gate_closed_sleep: Duration::from_millis(10),
        idle_sleep: Duration::from_millis(10),
        retry_backoff: Duration::from_millis(10),
        error_sleep: Duration::from_millis(10),
    })
}

#[tokio::test]
async fn test_exit_status_decides_item_fate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queues.db");

    {
        let (pool, registry, queue) = open(&path).await;
        let push = PushService::new(registry).unwrap();
        for job in ["ok", "bad", "busy"] {
            push.enqueue_coverage(&coverage(job)).await.unwrap();
        }

        let worker = command_worker(queue.clone());
        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Completed)
        );
        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Dropped)
        );
        assert!(matches!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Retry(_))
        ));

        let stats = worker.monitor().stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(queue.size().await.unwrap(), 1);
        pool.close().await;
    }

    // The retried item is still at the head after a restart
    let (_pool, _registry, queue) = open(&path).await;
    assert_eq!(queue.size().await.unwrap(), 1);
    assert_eq!(queue.peek().await.unwrap().unwrap().payload["job_id"], "busy");
}

#[tokio::test]
async fn test_timed_out_command_keeps_item() {
    let dir = tempfile::tempdir().unwrap();
    let (_pool, registry, queue) = open(&dir.path().join("queues.db")).await;
    PushService::new(registry)
        .unwrap()
        .enqueue_coverage(&coverage("slow"))
        .await
        .unwrap();

    let spec = CommandSpec::new("sh", Duration::from_millis(200))
        .with_args(vec!["-c".to_string(), "sleep 10".to_string()]);
    let handler: Arc<dyn ItemHandler<Value>> = Arc::new(CommandHandler::new(spec));
    let worker = QueueWorker::new(
        QueueName::new(COVERAGE_QUEUE).unwrap(),
        queue.clone(),
        Arc::new(ReadinessGate::always_open()),
        handler,
    );

    assert!(matches!(
        worker.process_next().await.unwrap(),
        Step::Processed(Disposition::Retry(_))
    ));
    assert_eq!(queue.size().await.unwrap(), 1);
}
