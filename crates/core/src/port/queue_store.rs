// Queue Store Port (Interface)

use crate::domain::{QueueDescriptor, WorkItem};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Ordered store of work items for a single queue
///
/// Safe for many producers and a single consumer. `peek` is idempotent and
/// returns `None` on an empty queue; `remove` on an empty queue is a no-op.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Append an item to the tail. Must fail loudly rather than drop the item.
    async fn append(&self, item: &WorkItem) -> Result<()>;

    /// Return the head item without removing it
    async fn peek(&self) -> Result<Option<WorkItem>>;

    /// Drop the current head item
    async fn remove(&self) -> Result<()>;

    /// Number of pending items
    async fn size(&self) -> Result<usize>;
}

/// Opens durable backing stores for queue descriptors
#[async_trait]
pub trait QueueFactory: Send + Sync {
    async fn open(&self, descriptor: &QueueDescriptor) -> Result<Arc<dyn DurableQueue>>;
}
