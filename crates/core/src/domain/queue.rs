// Queue Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Maximum queue name length
const MAX_QUEUE_NAME_LEN: usize = 64;

/// Validated queue name
///
/// Non-empty, at most 64 characters, ASCII alphanumeric plus `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(DomainError::InvalidQueueName {
                name,
                reason: "queue name is empty".to_string(),
            });
        }

        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(DomainError::InvalidQueueName {
                name,
                reason: format!("queue name too long (max {})", MAX_QUEUE_NAME_LEN),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidQueueName {
                name,
                reason: "only alphanumeric, '-' and '_' allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for QueueName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

impl std::str::FromStr for QueueName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Persistence mode of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceMode {
    /// Survives process restart; appends are crash-durable before returning
    Durable,
    /// In-memory only; pending items are lost on crash
    Transient,
}

impl std::fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceMode::Durable => write!(f, "DURABLE"),
            PersistenceMode::Transient => write!(f, "TRANSIENT"),
        }
    }
}

/// Item type carried by a queue (informational, used in logs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType(String);

impl ItemType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Queue descriptor, created once at start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: QueueName,
    pub mode: PersistenceMode,
    pub item_type: ItemType,
}

impl QueueDescriptor {
    pub fn new(name: QueueName, mode: PersistenceMode, item_type: ItemType) -> Self {
        Self {
            name,
            mode,
            item_type,
        }
    }

    pub fn durable(name: QueueName, item_type: ItemType) -> Self {
        Self::new(name, PersistenceMode::Durable, item_type)
    }

    pub fn transient(name: QueueName, item_type: ItemType) -> Self {
        Self::new(name, PersistenceMode::Transient, item_type)
    }
}

/// Work item stored in a queue
///
/// Identity is the position in the queue. Items are never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub payload: serde_json::Value,
    pub enqueued_at: i64, // epoch ms
}

impl WorkItem {
    pub fn new(payload: serde_json::Value, enqueued_at: i64) -> Self {
        Self {
            payload,
            enqueued_at,
        }
    }
}
