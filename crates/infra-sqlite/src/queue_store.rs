// SQLite DurableQueue Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use conduit_core::domain::{QueueDescriptor, QueueName, WorkItem};
use conduit_core::error::Result;
use conduit_core::port::{DurableQueue, QueueFactory};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

/// One named queue stored in the shared `queue_items` table
///
/// Items are ordered by an autoincrement sequence, so FIFO order survives
/// restarts. Appends commit before returning.
pub struct SqliteQueue {
    pool: SqlitePool,
    name: QueueName,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool, name: QueueName) -> Self {
        Self { pool, name }
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }
}

#[async_trait]
impl DurableQueue for SqliteQueue {
    async fn append(&self, item: &WorkItem) -> Result<()> {
        let payload = serde_json::to_string(&item.payload)?;

        sqlx::query("INSERT INTO queue_items (queue, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(self.name.as_str())
            .bind(payload)
            .bind(item.enqueued_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(queue = %self.name, "Item appended");
        Ok(())
    }

    async fn peek(&self) -> Result<Option<WorkItem>> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT payload, enqueued_at FROM queue_items WHERE queue = ? ORDER BY seq LIMIT 1",
        )
        .bind(self.name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some((payload, enqueued_at)) => Ok(Some(WorkItem::new(
                serde_json::from_str(&payload)?,
                enqueued_at,
            ))),
            None => Ok(None),
        }
    }

    async fn remove(&self) -> Result<()> {
        sqlx::query(
            "DELETE FROM queue_items
             WHERE seq = (SELECT MIN(seq) FROM queue_items WHERE queue = ?)",
        )
        .bind(self.name.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue = ?")
            .bind(self.name.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count as usize)
    }
}

/// Opens durable queues on a shared, migrated pool
pub struct SqliteQueueFactory {
    pool: SqlitePool,
}

impl SqliteQueueFactory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueFactory for SqliteQueueFactory {
    async fn open(&self, descriptor: &QueueDescriptor) -> Result<Arc<dyn DurableQueue>> {
        let queue = SqliteQueue::new(self.pool.clone(), descriptor.name.clone());
        let pending = queue.size().await?;
        info!(queue = %descriptor.name, pending, "Durable queue opened");
        Ok(Arc::new(queue))
    }
}
