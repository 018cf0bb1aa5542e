// Connectivity Probe Port

use async_trait::async_trait;

/// Checks whether the remote Server is reachable
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}
