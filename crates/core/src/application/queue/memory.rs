// Transient (in-memory) queue backing

use crate::domain::WorkItem;
use crate::error::Result;
use crate::port::DurableQueue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// In-memory FIFO queue; pending items are lost when the process exits
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn append(&self, item: &WorkItem) -> Result<()> {
        self.items.lock().push_back(item.clone());
        Ok(())
    }

    async fn peek(&self) -> Result<Option<WorkItem>> {
        Ok(self.items.lock().front().cloned())
    }

    async fn remove(&self) -> Result<()> {
        self.items.lock().pop_front();
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.items.lock().len())
    }
}
