// Application Layer - Use Cases and Business Logic

pub mod cache;
pub mod preflight;
pub mod push;
pub mod queue;
pub mod retry;
pub mod router;
pub mod task_queue;
pub mod worker;

// Re-exports
pub use cache::{CacheConfig, CacheStats, RefreshableCache};
pub use preflight::{EnabledFlag, Reachability, ReadinessGate, ReadinessStats};
pub use push::PushService;
pub use queue::{MemoryQueue, QueueRegistry, TransientOnly};
pub use retry::{Classification, Disposition, RetryPolicy};
pub use router::{InMemoryRootTracker, RouterConfig, TaskRouter};
pub use task_queue::{QueueResultSink, TaskQueueHandler};
pub use worker::{
    handler_fn, shutdown_channel, ItemHandler, QueueWorker, ShutdownSender, ShutdownToken,
    WorkerConfig, WorkerMonitor, WorkerState, WorkerStats, WorkerSupervisor,
};
