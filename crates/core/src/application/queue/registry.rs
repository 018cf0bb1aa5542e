// Queue Registry
//
// Explicit registry of named queues passed to each component at construction.

use crate::domain::{PersistenceMode, QueueDescriptor, QueueName, WorkItem};
use crate::error::{AppError, Result};
use crate::port::{DurableQueue, QueueFactory, TimeProvider};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::MemoryQueue;

/// Factory for hosts that only use transient queues
pub struct TransientOnly;

#[async_trait]
impl QueueFactory for TransientOnly {
    async fn open(&self, descriptor: &QueueDescriptor) -> Result<Arc<dyn DurableQueue>> {
        Err(AppError::Config(format!(
            "No durable backing configured for queue {}",
            descriptor.name
        )))
    }
}

struct RegisteredQueue {
    descriptor: QueueDescriptor,
    queue: Arc<dyn DurableQueue>,
}

/// Registry of named queues
pub struct QueueRegistry {
    factory: Arc<dyn QueueFactory>,
    time_provider: Arc<dyn TimeProvider>,
    queues: RwLock<HashMap<QueueName, RegisteredQueue>>,
}

impl QueueRegistry {
    /// Create a registry
    ///
    /// # Arguments
    /// * `factory` - Opens durable backing stores
    /// * `time_provider` - Stamps `enqueued_at` on appended items
    pub fn new(factory: Arc<dyn QueueFactory>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            factory,
            time_provider,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Open (or return the already opened) queue for a descriptor
    ///
    /// Re-opening a name with a different persistence mode is rejected.
    pub async fn open(&self, descriptor: QueueDescriptor) -> Result<Arc<dyn DurableQueue>> {
        if let Some(existing) = self.lookup(&descriptor)? {
            return Ok(existing);
        }

        let queue: Arc<dyn DurableQueue> = match descriptor.mode {
            PersistenceMode::Transient => Arc::new(MemoryQueue::new()),
            PersistenceMode::Durable => self.factory.open(&descriptor).await?,
        };

        let mut queues = self.queues.write();
        // Another caller may have opened it while the factory was running
        if let Some(existing) = queues.get(&descriptor.name) {
            return Ok(Arc::clone(&existing.queue));
        }

        info!(
            queue = %descriptor.name,
            mode = %descriptor.mode,
            item_type = %descriptor.item_type.as_str(),
            "Queue opened"
        );
        queues.insert(
            descriptor.name.clone(),
            RegisteredQueue {
                descriptor,
                queue: Arc::clone(&queue),
            },
        );
        Ok(queue)
    }

    fn lookup(&self, descriptor: &QueueDescriptor) -> Result<Option<Arc<dyn DurableQueue>>> {
        let queues = self.queues.read();
        match queues.get(&descriptor.name) {
            Some(existing) if existing.descriptor.mode != descriptor.mode => {
                Err(AppError::Validation(format!(
                    "Queue {} already opened as {}",
                    descriptor.name, existing.descriptor.mode
                )))
            }
            Some(existing) => Ok(Some(Arc::clone(&existing.queue))),
            None => Ok(None),
        }
    }

    /// Get an opened queue by name
    pub fn get(&self, name: &QueueName) -> Option<Arc<dyn DurableQueue>> {
        self.queues.read().get(name).map(|q| Arc::clone(&q.queue))
    }

    /// Descriptor of an opened queue
    pub fn descriptor(&self, name: &QueueName) -> Option<QueueDescriptor> {
        self.queues.read().get(name).map(|q| q.descriptor.clone())
    }

    /// Names of all opened queues
    pub fn names(&self) -> Vec<QueueName> {
        let mut names: Vec<QueueName> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Serialize an item and append it to the named queue
    ///
    /// A failed append is returned to the caller; nothing is dropped silently.
    pub async fn enqueue<T: Serialize>(&self, name: &QueueName, item: &T) -> Result<()> {
        let payload = serde_json::to_value(item)?;
        self.enqueue_raw(name, payload).await
    }

    /// Append a raw JSON payload to the named queue
    pub async fn enqueue_raw(&self, name: &QueueName, payload: serde_json::Value) -> Result<()> {
        let queue = self
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not registered", name)))?;

        let item = WorkItem::new(payload, self.time_provider.now_millis());
        queue.append(&item).await?;

        debug!(queue = %name, "Item enqueued");
        Ok(())
    }

    /// Pending item count per queue
    pub async fn sizes(&self) -> Result<BTreeMap<String, usize>> {
        let snapshot: Vec<(QueueName, Arc<dyn DurableQueue>)> = self
            .queues
            .read()
            .iter()
            .map(|(name, q)| (name.clone(), Arc::clone(&q.queue)))
            .collect();

        let mut sizes = BTreeMap::new();
        for (name, queue) in snapshot {
            sizes.insert(name.to_string(), queue.size().await?);
        }
        Ok(sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemType;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use serde_json::json;

    fn registry() -> QueueRegistry {
        QueueRegistry::new(Arc::new(TransientOnly), Arc::new(ManualTimeProvider::new(42)))
    }

    fn transient(name: &str) -> QueueDescriptor {
        QueueDescriptor::transient(QueueName::new(name).unwrap(), ItemType::new("test"))
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let registry = registry();
        let first = registry.open(transient("signals")).await.unwrap();
        let second = registry.open(transient("signals")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.names().len(), 1);
    }

    #[tokio::test]
    async fn test_open_with_different_mode_rejected() {
        let registry = registry();
        registry.open(transient("signals")).await.unwrap();

        let durable =
            QueueDescriptor::durable(QueueName::new("signals").unwrap(), ItemType::new("test"));
        let err = registry.open(durable).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_durable_without_backing_fails() {
        let registry = registry();
        let durable =
            QueueDescriptor::durable(QueueName::new("pushes").unwrap(), ItemType::new("test"));
        assert!(matches!(
            registry.open(durable).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_stamps_time_and_counts() {
        let registry = registry();
        let queue = registry.open(transient("signals")).await.unwrap();
        let name = QueueName::new("signals").unwrap();

        registry.enqueue(&name, &json!({"k": "v"})).await.unwrap();

        let head = queue.peek().await.unwrap().unwrap();
        assert_eq!(head.enqueued_at, 42);
        assert_eq!(head.payload["k"], "v");

        let sizes = registry.sizes().await.unwrap();
        assert_eq!(sizes.get("signals"), Some(&1));
    }

    #[tokio::test]
    async fn test_enqueue_unknown_queue() {
        let registry = registry();
        let name = QueueName::new("missing").unwrap();
        let err = registry.enqueue(&name, &json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
