// Result Sink Port

use crate::domain::ResultEnvelope;
use crate::error::Result;
use async_trait::async_trait;

/// Receives routed results of queued tasks (delivery to the Server is owned
/// by the host)
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, result: ResultEnvelope) -> Result<()>;
}
