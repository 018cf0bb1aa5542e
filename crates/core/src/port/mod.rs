// Port Layer - Interfaces for external dependencies

pub mod connectivity;
pub mod precondition;
pub mod queue_store;
pub mod result_sink;
pub mod task_handlers;
pub mod time_provider;

// Re-exports
pub use connectivity::ConnectivityProbe;
pub use precondition::Precondition;
pub use queue_store::{DurableQueue, QueueFactory};
pub use result_sink::ResultSink;
pub use task_handlers::{RootTracker, TaskError, TaskHandlers, TaskReply, TaskResult};
pub use time_provider::TimeProvider;
