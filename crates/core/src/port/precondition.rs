// Readiness precondition port

use async_trait::async_trait;

/// A single host-defined precondition consulted by the readiness gate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Precondition: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the precondition currently holds. Must not block for long.
    async fn holds(&self) -> bool;
}
