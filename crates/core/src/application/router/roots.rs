// In-memory root tracking

use crate::port::RootTracker;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Root job identifiers seen by the router
#[derive(Default)]
pub struct InMemoryRootTracker {
    roots: RwLock<BTreeSet<String>>,
}

impl InMemoryRootTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.roots.read().contains(job_id)
    }

    pub fn roots(&self) -> Vec<String> {
        self.roots.read().iter().cloned().collect()
    }
}

impl RootTracker for InMemoryRootTracker {
    fn record_root(&self, job_id: &str) {
        self.roots.write().insert(job_id.to_string());
    }
}
