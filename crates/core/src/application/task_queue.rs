// Task queue handler: routes queued commands and publishes their results

use crate::application::queue::QueueRegistry;
use crate::application::router::TaskRouter;
use crate::application::worker::ItemHandler;
use crate::domain::{Outcome, QueueName, ResultEnvelope, TaskEnvelope};
use crate::error::{AppError, Result};
use crate::port::ResultSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Handler of the `tasks` queue
///
/// Routing never fails; only a sink failure is retried, which may route the
/// same command again.
pub struct TaskQueueHandler {
    router: Arc<TaskRouter>,
    sink: Arc<dyn ResultSink>,
}

impl TaskQueueHandler {
    pub fn new(router: Arc<TaskRouter>, sink: Arc<dyn ResultSink>) -> Self {
        Self { router, sink }
    }
}

#[async_trait]
impl ItemHandler<TaskEnvelope> for TaskQueueHandler {
    async fn handle(&self, envelope: TaskEnvelope) -> Result<Outcome> {
        let task_id = envelope.id.clone();
        let result = self.router.dispatch_envelope(envelope).await;
        debug!(task_id = %task_id, status = result.status, "Queued task routed");

        match self.sink.publish(result).await {
            Ok(()) => Ok(Outcome::Success),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Result publish failed");
                Ok(Outcome::retry(format!("Result publish failed: {}", e)))
            }
        }
    }
}

/// Sink appending results to a queue in the registry
///
/// Results stay queued until a consumer collects them with `take`.
pub struct QueueResultSink {
    registry: Arc<QueueRegistry>,
    queue: QueueName,
    // The queue allows a single consumer; concurrent takers are serialised
    take_lock: Mutex<()>,
}

impl QueueResultSink {
    pub fn new(registry: Arc<QueueRegistry>, queue: QueueName) -> Self {
        Self {
            registry,
            queue,
            take_lock: Mutex::new(()),
        }
    }

    /// Remove and return up to `limit` published results, oldest first
    ///
    /// Entries that are not valid result envelopes are discarded.
    pub async fn take(&self, limit: usize) -> Result<Vec<ResultEnvelope>> {
        let queue = self
            .registry
            .get(&self.queue)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not registered", self.queue)))?;

        let _guard = self.take_lock.lock().await;
        let mut results = Vec::new();
        while results.len() < limit {
            let Some(item) = queue.peek().await? else {
                break;
            };
            match serde_json::from_value::<ResultEnvelope>(item.payload) {
                Ok(result) => results.push(result),
                Err(e) => warn!(queue = %self.queue, error = %e, "Discarding malformed result"),
            }
            queue.remove().await?;
        }
        Ok(results)
    }
}

#[async_trait]
impl ResultSink for QueueResultSink {
    async fn publish(&self, result: ResultEnvelope) -> Result<()> {
        self.registry.enqueue(&self.queue, &result).await
    }
}
