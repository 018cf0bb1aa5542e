//! Readiness gate ("preflight")
//!
//! Shared precondition check consulted by every queue worker before a dequeue
//! attempt. The gate is advisory: it never touches a queue.

use crate::application::worker::ShutdownToken;
use crate::port::{ConnectivityProbe, Precondition};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Gate counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessStats {
    pub checks: u64,
    pub not_ready: u64,
    pub ready_empty: u64,
}

/// Readiness gate composed of preconditions; all must hold
pub struct ReadinessGate {
    preconditions: Vec<Arc<dyn Precondition>>,
    checks: AtomicU64,
    not_ready: AtomicU64,
    ready_empty: AtomicU64,
}

impl ReadinessGate {
    pub fn new(preconditions: Vec<Arc<dyn Precondition>>) -> Self {
        Self {
            preconditions,
            checks: AtomicU64::new(0),
            not_ready: AtomicU64::new(0),
            ready_empty: AtomicU64::new(0),
        }
    }

    /// Gate with no preconditions (always ready)
    pub fn always_open() -> Self {
        Self::new(Vec::new())
    }

    /// Evaluate every precondition, stopping at the first that fails
    pub async fn check_ready(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);

        for precondition in &self.preconditions {
            if !precondition.holds().await {
                self.not_ready.fetch_add(1, Ordering::Relaxed);
                debug!(precondition = precondition.name(), "Readiness gate closed");
                return false;
            }
        }
        true
    }

    /// Record a ready check that found its queue empty
    pub fn record_empty(&self) {
        self.ready_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ReadinessStats {
        ReadinessStats {
            checks: self.checks.load(Ordering::Relaxed),
            not_ready: self.not_ready.load(Ordering::Relaxed),
            ready_empty: self.ready_empty.load(Ordering::Relaxed),
        }
    }
}

/// Administrative on/off switch for the integration
pub struct EnabledFlag {
    enabled: AtomicBool,
}

impl EnabledFlag {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Integration toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Precondition for EnabledFlag {
    fn name(&self) -> &'static str {
        "integration-enabled"
    }

    async fn holds(&self) -> bool {
        self.is_enabled()
    }
}

/// Last known connectivity to the Server
///
/// Starts reachable; only a failed probe closes it.
pub struct Reachability {
    reachable: AtomicBool,
}

impl Default for Reachability {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
        }
    }
}

impl Reachability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, reachable: bool) {
        let previous = self.reachable.swap(reachable, Ordering::SeqCst);
        if previous && !reachable {
            warn!("Server marked unreachable");
        } else if !previous && reachable {
            info!("Server reachable again");
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Probe periodically until shutdown
    pub async fn run_probe_loop(
        self: Arc<Self>,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
        mut shutdown: ShutdownToken,
    ) {
        info!(interval_ms = interval.as_millis() as u64, "Reachability probe started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.mark(probe.probe().await);

            tokio::select! {
                _ = sleep(interval) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!("Reachability probe stopped");
    }
}

#[async_trait]
impl Precondition for Reachability {
    fn name(&self) -> &'static str {
        "server-reachable"
    }

    async fn holds(&self) -> bool {
        self.is_reachable()
    }
}
