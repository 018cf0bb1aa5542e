// Worker Supervisor - one worker task per queue

use super::{shutdown_channel, QueueWorker, ShutdownSender, ShutdownToken, WorkerMonitor, WorkerStats};
use crate::domain::QueueName;
use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

struct SupervisedWorker {
    name: QueueName,
    monitor: WorkerMonitor,
    handle: JoinHandle<()>,
}

/// Owns the worker tasks and their shared shutdown signal
pub struct WorkerSupervisor {
    shutdown: ShutdownSender,
    workers: Vec<SupervisedWorker>,
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        let (shutdown, _) = shutdown_channel();
        Self {
            shutdown,
            workers: Vec::new(),
        }
    }

    /// Token for other background loops that should stop with the workers
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.subscribe()
    }

    /// Spawn a worker on its own task
    ///
    /// A queue has exactly one consumer; a second worker for the same queue
    /// is rejected.
    pub fn spawn<T>(&mut self, worker: QueueWorker<T>) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let name = worker.name().clone();
        if self.workers.iter().any(|w| w.name == name) {
            return Err(AppError::Validation(format!(
                "Queue {} already has a worker",
                name
            )));
        }

        let monitor = worker.monitor();
        let token = self.shutdown.subscribe();
        let handle = tokio::spawn(async move { worker.run(token).await });

        info!(queue = %name, "Worker spawned");
        self.workers.push(SupervisedWorker {
            name,
            monitor,
            handle,
        });
        Ok(())
    }

    /// Monitors of every spawned worker, keyed by queue name
    pub fn monitors(&self) -> BTreeMap<String, WorkerMonitor> {
        self.workers
            .iter()
            .map(|w| (w.name.to_string(), w.monitor.clone()))
            .collect()
    }

    pub fn stats(&self) -> BTreeMap<String, WorkerStats> {
        self.workers
            .iter()
            .map(|w| (w.name.to_string(), w.monitor.stats()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Signal shutdown and wait for every worker to finish its iteration
    ///
    /// Workers still running after `grace` are aborted. Their head item stays
    /// in the queue and is delivered again on the next start.
    pub async fn shutdown(self, grace: Duration) {
        info!(workers = self.workers.len(), "Stopping workers");
        self.shutdown.shutdown();

        let deadline = Instant::now() + grace;
        for mut worker in self.workers {
            match timeout_at(deadline, &mut worker.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(queue = %worker.name, error = %e, "Worker task failed"),
                Err(_) => {
                    warn!(queue = %worker.name, "Worker did not stop in time, aborting");
                    worker.handle.abort();
                }
            }
        }
        info!("All workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::preflight::ReadinessGate;
    use crate::application::queue::MemoryQueue;
    use crate::application::worker::{handler_fn, ItemHandler, WorkerConfig};
    use crate::domain::{Outcome, WorkItem};
    use crate::port::DurableQueue;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn worker(name: &str, queue: Arc<MemoryQueue>) -> QueueWorker<Value> {
        let handler: Arc<dyn ItemHandler<Value>> =
            Arc::new(handler_fn(|_item: Value| async { Ok(Outcome::Success) }));
        QueueWorker::new(
            QueueName::new(name).unwrap(),
            queue,
            Arc::new(ReadinessGate::always_open()),
            handler,
        )
        .with_config(WorkerConfig {
            idle_sleep: Duration::from_millis(5),
            ..WorkerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_one_worker_per_queue() {
        let mut supervisor = WorkerSupervisor::new();
        supervisor
            .spawn(worker("coverage-push", Arc::new(MemoryQueue::new())))
            .unwrap();
        let err = supervisor
            .spawn(worker("coverage-push", Arc::new(MemoryQueue::new())))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(supervisor.len(), 1);

        supervisor.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_queues_drain_independently() {
        let first = Arc::new(MemoryQueue::new());
        let second = Arc::new(MemoryQueue::new());
        for i in 0..3 {
            first.append(&WorkItem::new(json!(i), 0)).await.unwrap();
            second.append(&WorkItem::new(json!(i), 0)).await.unwrap();
        }

        let mut supervisor = WorkerSupervisor::new();
        supervisor.spawn(worker("first", first.clone())).unwrap();
        supervisor.spawn(worker("second", second.clone())).unwrap();

        for _ in 0..200 {
            let processed: u64 = supervisor.stats().values().map(|s| s.processed).sum();
            if processed == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stats = supervisor.stats();
        assert_eq!(stats["first"].processed, 3);
        assert_eq!(stats["second"].processed, 3);
        assert_eq!(first.size().await.unwrap(), 0);

        let token = supervisor.shutdown_token();
        supervisor.shutdown(Duration::from_secs(1)).await;
        assert!(token.is_shutdown());
    }
}
