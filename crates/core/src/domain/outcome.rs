// Processing Outcome

use serde::{Deserialize, Serialize};

/// Classification returned by a queue item handler
///
/// - `Success`: item is removed
/// - `Retry`: transient condition, item stays at the head and is retried after backoff
/// - `Drop`: item is unprocessable, removed without retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Retry(String),
    Drop(String),
}

impl Outcome {
    pub fn retry(reason: impl Into<String>) -> Self {
        Outcome::Retry(reason.into())
    }

    pub fn drop_item(reason: impl Into<String>) -> Self {
        Outcome::Drop(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "SUCCESS"),
            Outcome::Retry(reason) => write!(f, "RETRY ({})", reason),
            Outcome::Drop(reason) => write!(f, "DROP ({})", reason),
        }
    }
}
