// TCP reachability probe for the remote Server

use async_trait::async_trait;
use conduit_core::port::ConnectivityProbe;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default connect timeout for a probe
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Considers the Server reachable when a TCP connection to `addr` succeeds
pub struct TcpReachability {
    addr: String,
    connect_timeout: Duration,
}

impl TcpReachability {
    /// # Arguments
    /// * `addr` - `host:port` of the Server
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl ConnectivityProbe for TcpReachability {
    async fn probe(&self) -> bool {
        match timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "Probe connect failed");
                false
            }
            Err(_) => {
                debug!(addr = %self.addr, "Probe connect timed out");
                false
            }
        }
    }
}
