// Failure classification and retry policy

use crate::domain::Outcome;
use std::time::Duration;
use tracing::{error, warn};

use super::worker::constants::TEMPORARY_FAILURE_BACKOFF;

/// Classified result of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Retryable (service unavailable, rate limited, network error)
    Temporary(String),
    /// Unretryable (bad data, resource gone, business-rule rejection)
    Permanent(String),
    /// Anything else, including handler errors, panics and undecodable items
    Unclassified(String),
}

impl From<Outcome> for Classification {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => Classification::Success,
            Outcome::Retry(reason) => Classification::Temporary(reason),
            Outcome::Drop(reason) => Classification::Permanent(reason),
        }
    }
}

/// What the worker does with the head item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove after success
    Completed,
    /// Keep at the head and sleep before the next attempt
    Retry(Duration),
    /// Remove without retry
    Dropped,
}

impl Disposition {
    pub fn removes_item(&self) -> bool {
        !matches!(self, Disposition::Retry(_))
    }
}

/// Retry policy: fixed backoff, unbounded retries for temporary failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(TEMPORARY_FAILURE_BACKOFF)
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `backoff` - Fixed sleep after a temporary failure (default: 15s)
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Decide the disposition for a classification and log it
    ///
    /// Temporary failures never exhaust: the item is retried until it
    /// succeeds or is reclassified.
    pub fn decide(&self, queue: &str, classification: &Classification) -> Disposition {
        match classification {
            Classification::Success => Disposition::Completed,
            Classification::Temporary(reason) => {
                warn!(
                    queue = %queue,
                    reason = %reason,
                    backoff_ms = self.backoff.as_millis() as u64,
                    "Temporary failure, item kept at head"
                );
                Disposition::Retry(self.backoff)
            }
            Classification::Permanent(reason) => {
                error!(queue = %queue, reason = %reason, "Permanent failure, item dropped");
                Disposition::Dropped
            }
            Classification::Unclassified(detail) => {
                error!(
                    queue = %queue,
                    detail = %detail,
                    "Unexpected failure while processing item, item dropped"
                );
                Disposition::Dropped
            }
        }
    }
}
