// Worker - Queue draining loop

pub mod constants;
mod handler;
mod shutdown;
mod supervisor;

use constants::*;
pub use handler::{handler_fn, FnHandler, ItemHandler};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use supervisor::WorkerSupervisor;

use crate::application::preflight::ReadinessGate;
use crate::application::retry::{Classification, Disposition, RetryPolicy};
use crate::domain::{QueueName, WorkItem};
use crate::error::Result;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{DurableQueue, TimeProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Worker timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Pause while the readiness gate is closed
    pub gate_closed_sleep: Duration,
    /// Pause after an empty peek
    pub idle_sleep: Duration,
    /// Fixed backoff after a temporary failure
    pub retry_backoff: Duration,
    /// Pause after a queue store error
    pub error_sleep: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            gate_closed_sleep: GATE_CLOSED_SLEEP_DURATION,
            idle_sleep: IDLE_SLEEP_DURATION,
            retry_backoff: TEMPORARY_FAILURE_BACKOFF,
            error_sleep: ERROR_RECOVERY_SLEEP_DURATION,
        }
    }
}

/// Observable worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Queue empty or gate closed
    Idle,
    /// Handler running on the head item
    Processing,
    /// Sleeping after a temporary failure
    Backoff,
    /// Head item was just abandoned
    Dropped,
}

/// Snapshot of a worker's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub state: WorkerState,
    pub processed: u64,
    pub retried: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct WorkerCounters {
    processed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

/// Read-only view of a running worker
#[derive(Clone)]
pub struct WorkerMonitor {
    counters: Arc<WorkerCounters>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerMonitor {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            state: self.state(),
            processed: self.counters.processed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Result of a single loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Readiness gate closed; the queue was not touched
    GateClosed,
    /// Gate open but nothing pending
    Empty,
    /// Head item handled
    Processed(Disposition),
}

/// Drains one queue, one item at a time, in FIFO order
///
/// Exactly one worker may consume a queue. Items are decoded into `T`
/// before the handler sees them.
pub struct QueueWorker<T: Send + 'static> {
    name: QueueName,
    queue: Arc<dyn DurableQueue>,
    gate: Arc<ReadinessGate>,
    handler: Arc<dyn ItemHandler<T>>,
    retry_policy: RetryPolicy,
    config: WorkerConfig,
    time_provider: Arc<dyn TimeProvider>,
    counters: Arc<WorkerCounters>,
    state_tx: watch::Sender<WorkerState>,
    _item: PhantomData<fn() -> T>,
}

impl<T> QueueWorker<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(
        name: QueueName,
        queue: Arc<dyn DurableQueue>,
        gate: Arc<ReadinessGate>,
        handler: Arc<dyn ItemHandler<T>>,
    ) -> Self {
        let config = WorkerConfig::default();
        let (state_tx, _) = watch::channel(WorkerState::Idle);
        Self {
            name,
            queue,
            gate,
            handler,
            retry_policy: RetryPolicy::new(config.retry_backoff),
            config,
            time_provider: Arc::new(SystemTimeProvider),
            counters: Arc::new(WorkerCounters::default()),
            state_tx,
            _item: PhantomData,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.retry_policy = RetryPolicy::new(config.retry_backoff);
        self.config = config;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn monitor(&self) -> WorkerMonitor {
        WorkerMonitor {
            counters: Arc::clone(&self.counters),
            state: self.state_tx.subscribe(),
        }
    }

    /// Run worker loop until shutdown
    ///
    /// Shutdown interrupts sleeps but never a running handler; the loop exits
    /// after the current iteration.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(queue = %self.name, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let pause = match self.process_next().await {
                Ok(Step::GateClosed) => Some(self.config.gate_closed_sleep),
                Ok(Step::Empty) => Some(self.config.idle_sleep),
                Ok(Step::Processed(Disposition::Retry(backoff))) => Some(backoff),
                Ok(Step::Processed(_)) => None,
                Err(e) => {
                    error!(queue = %self.name, error = %e, "Queue store error");
                    Some(self.config.error_sleep)
                }
            };

            if let Some(duration) = pause {
                tokio::select! {
                    _ = sleep(duration) => {},
                    _ = shutdown.wait() => {
                        debug!(queue = %self.name, "Worker interrupted while sleeping");
                        break;
                    }
                }
            }
            self.set_state(WorkerState::Idle);
        }
        self.set_state(WorkerState::Idle);
        info!(queue = %self.name, "Worker stopped");
    }

    /// Run a single iteration: gate check, peek, handle, classify
    ///
    /// Store errors are returned and leave the head item in place.
    pub async fn process_next(&self) -> Result<Step> {
        if !self.gate.check_ready().await {
            return Ok(Step::GateClosed);
        }

        let item = match self.queue.peek().await? {
            Some(item) => item,
            None => {
                self.gate.record_empty();
                return Ok(Step::Empty);
            }
        };

        self.set_state(WorkerState::Processing);
        let age_ms = self.time_provider.now_millis() - item.enqueued_at;
        let classification = self.invoke(item).await;
        let disposition = self.retry_policy.decide(self.name.as_str(), &classification);

        match disposition {
            Disposition::Completed => {
                self.queue.remove().await?;
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                debug!(queue = %self.name, age_ms, "Item processed");
            }
            Disposition::Dropped => {
                self.queue.remove().await?;
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.set_state(WorkerState::Dropped);
            }
            Disposition::Retry(_) => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                self.set_state(WorkerState::Backoff);
            }
        }

        Ok(Step::Processed(disposition))
    }

    /// Decode and hand the item to the handler on its own task
    async fn invoke(&self, item: WorkItem) -> Classification {
        let decoded: T = match serde_json::from_value(item.payload) {
            Ok(decoded) => decoded,
            Err(e) => return Classification::Unclassified(format!("Undecodable item: {}", e)),
        };

        // Separate task so a panicking handler cannot take the loop down
        let handler = Arc::clone(&self.handler);
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.handle(decoded).await }));
        let joined = (&mut task.0).await;

        match joined {
            Ok(Ok(outcome)) => Classification::from(outcome),
            Ok(Err(e)) => Classification::Unclassified(format!("Handler error: {}", e)),
            Err(e) if e.is_panic() => Classification::Unclassified("Handler panicked".to_string()),
            Err(e) => Classification::Unclassified(format!("Handler task failed: {}", e)),
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Aborts the handler task when the worker stops waiting on it
struct AbortOnDrop<R>(JoinHandle<R>);

impl<R> Drop for AbortOnDrop<R> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::preflight::EnabledFlag;
    use crate::application::queue::MemoryQueue;
    use crate::domain::{CoverageItem, Outcome};
    use crate::error::AppError;
    use crate::port::queue_store::MockDurableQueue;
    use crate::port::Precondition;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicBool;

    fn queue_name() -> QueueName {
        QueueName::new("test-queue").unwrap()
    }

    async fn filled(payloads: &[Value]) -> Arc<MemoryQueue> {
        let queue = Arc::new(MemoryQueue::new());
        for payload in payloads {
            queue.append(&WorkItem::new(payload.clone(), 0)).await.unwrap();
        }
        queue
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            gate_closed_sleep: Duration::from_millis(5),
            idle_sleep: Duration::from_millis(5),
            retry_backoff: Duration::from_millis(5),
            error_sleep: Duration::from_millis(5),
        }
    }

    /// Records every payload it sees and answers from a script
    fn recording<F>(seen: Arc<Mutex<Vec<Value>>>, decide: F) -> Arc<dyn ItemHandler<Value>>
    where
        F: Fn(&Value, usize) -> Outcome + Send + Sync + 'static,
    {
        Arc::new(handler_fn(move |item: Value| {
            let outcome = {
                let mut seen = seen.lock();
                seen.push(item.clone());
                let attempts = seen.iter().filter(|v| **v == item).count();
                decide(&item, attempts)
            };
            async move { Ok(outcome) }
        }))
    }

    #[tokio::test]
    async fn test_fifo_order_and_drain() {
        let queue = filled(&[json!(1), json!(2), json!(3)]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            recording(seen.clone(), |_, _| Outcome::Success),
        );

        for _ in 0..3 {
            assert_eq!(
                worker.process_next().await.unwrap(),
                Step::Processed(Disposition::Completed)
            );
        }
        assert_eq!(worker.process_next().await.unwrap(), Step::Empty);

        assert_eq!(*seen.lock(), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(queue.size().await.unwrap(), 0);
        assert_eq!(worker.monitor().stats().processed, 3);
    }

    #[tokio::test]
    async fn test_temporary_failure_keeps_item_at_head() {
        let queue = filled(&[json!("a"), json!("b")]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        // "a" fails three times, then succeeds
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            recording(seen.clone(), |item, attempts| {
                if item == "a" && attempts <= 3 {
                    Outcome::retry("service unavailable")
                } else {
                    Outcome::Success
                }
            }),
        )
        .with_config(fast_config());

        for _ in 0..3 {
            assert_eq!(
                worker.process_next().await.unwrap(),
                Step::Processed(Disposition::Retry(Duration::from_millis(5)))
            );
            assert_eq!(queue.size().await.unwrap(), 2);
        }
        worker.process_next().await.unwrap();
        worker.process_next().await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![json!("a"), json!("a"), json!("a"), json!("a"), json!("b")]
        );
        let stats = worker.monitor().stats();
        assert_eq!(stats.retried, 3);
        assert_eq!(stats.processed, 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_once() {
        let queue = filled(&[json!("bad"), json!("good")]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            recording(seen.clone(), |item, _| {
                if item == "bad" {
                    Outcome::drop_item("bad request")
                } else {
                    Outcome::Success
                }
            }),
        );

        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Dropped)
        );
        assert_eq!(queue.size().await.unwrap(), 1);
        assert_eq!(queue.peek().await.unwrap().unwrap().payload, json!("good"));
        assert_eq!(worker.monitor().state(), WorkerState::Dropped);
        assert_eq!(worker.monitor().stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_dropped() {
        let queue = filled(&[json!("x")]).await;
        let handler: Arc<dyn ItemHandler<Value>> = Arc::new(handler_fn(|_item: Value| async {
            Err(AppError::Internal("unexpected".to_string()))
        }));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            handler,
        );

        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Dropped)
        );
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_item_is_dropped_without_calling_handler() {
        let queue = filled(&[json!(42)]).await;
        let calls = Arc::new(AtomicU64::new(0));
        let counted = calls.clone();
        let handler: Arc<dyn ItemHandler<CoverageItem>> =
            Arc::new(handler_fn(move |_item: CoverageItem| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok(Outcome::Success) }
            }));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            handler,
        );

        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Dropped)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let queue = filled(&[json!({"poison": true}), json!({"poison": false})]).await;
        let handler: Arc<dyn ItemHandler<Value>> = Arc::new(handler_fn(|item: Value| async move {
            if item["poison"] == json!(true) {
                panic!("poison item");
            }
            Ok(Outcome::Success)
        }));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            handler,
        );

        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Dropped)
        );
        assert_eq!(
            worker.process_next().await.unwrap(),
            Step::Processed(Disposition::Completed)
        );
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_gate_closed_never_touches_queue() {
        let mut queue = MockDurableQueue::new();
        queue.expect_peek().times(0);
        queue.expect_remove().times(0);

        let flag = Arc::new(EnabledFlag::new(false));
        let gate = Arc::new(ReadinessGate::new(vec![flag as Arc<dyn Precondition>]));
        let handler: Arc<dyn ItemHandler<Value>> =
            Arc::new(handler_fn(|_item: Value| async { Ok(Outcome::Success) }));
        let worker = QueueWorker::new(queue_name(), Arc::new(queue), gate.clone(), handler);

        for _ in 0..5 {
            assert_eq!(worker.process_next().await.unwrap(), Step::GateClosed);
        }
        assert_eq!(gate.stats().not_ready, 5);
    }

    #[tokio::test]
    async fn test_peek_error_leaves_item() {
        let mut queue = MockDurableQueue::new();
        queue
            .expect_peek()
            .times(1)
            .returning(|| Err(AppError::Queue("disk gone".to_string())));
        queue.expect_remove().times(0);

        let handler: Arc<dyn ItemHandler<Value>> =
            Arc::new(handler_fn(|_item: Value| async { Ok(Outcome::Success) }));
        let worker = QueueWorker::new(
            queue_name(),
            Arc::new(queue),
            Arc::new(ReadinessGate::always_open()),
            handler,
        );

        assert!(matches!(
            worker.process_next().await,
            Err(AppError::Queue(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_queue_counted_by_gate() {
        let gate = Arc::new(ReadinessGate::always_open());
        let handler: Arc<dyn ItemHandler<Value>> =
            Arc::new(handler_fn(|_item: Value| async { Ok(Outcome::Success) }));
        let worker = QueueWorker::new(
            queue_name(),
            Arc::new(MemoryQueue::new()),
            gate.clone(),
            handler,
        );

        assert_eq!(worker.process_next().await.unwrap(), Step::Empty);
        assert_eq!(gate.stats().ready_empty, 1);
    }

    #[tokio::test]
    async fn test_run_drains_and_stops_on_shutdown() {
        let queue = filled(&[json!(1), json!(2)]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            recording(seen.clone(), |_, _| Outcome::Success),
        )
        .with_config(fast_config());

        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        for _ in 0..100 {
            if queue.size().await.unwrap() == 0 {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.size().await.unwrap(), 0);

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let queue = filled(&[json!("stuck")]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            recording(seen.clone(), |_, _| Outcome::retry("rate limited")),
        );
        let mut states = worker.monitor().subscribe();

        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        // Default backoff is 15s; wait until the worker is in it
        tokio::time::timeout(Duration::from_secs(1), states.wait_for(|s| *s == WorkerState::Backoff))
            .await
            .unwrap()
            .unwrap();

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Item survives for the next run
        assert_eq!(queue.size().await.unwrap(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_worker_aborts_running_handler() {
        let queue = filled(&[json!("slow")]).await;
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (on_start, on_finish) = (started.clone(), finished.clone());
        let handler: Arc<dyn ItemHandler<Value>> = Arc::new(handler_fn(move |_item: Value| {
            let (on_start, on_finish) = (on_start.clone(), on_finish.clone());
            async move {
                on_start.store(true, Ordering::SeqCst);
                sleep(Duration::from_millis(200)).await;
                on_finish.store(true, Ordering::SeqCst);
                Ok(Outcome::Success)
            }
        }));
        let worker = QueueWorker::new(
            queue_name(),
            queue.clone(),
            Arc::new(ReadinessGate::always_open()),
            handler,
        );

        let task = tokio::spawn(async move { worker.process_next().await });
        while !started.load(Ordering::SeqCst) {
            sleep(Duration::from_millis(5)).await;
        }
        task.abort();

        sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(queue.size().await.unwrap(), 1);
    }
}
