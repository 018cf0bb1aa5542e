//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.
//! `bridge.dispatch.v1` and `bridge.submit.v1` take a `TaskEnvelope`
//! directly; `bridge.dispatch.v1` answers with a `ResultEnvelope`.

use conduit_core::application::{ReadinessStats, WorkerStats};
use conduit_core::domain::ResultEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// bridge.submit.v1 - Queue a command for asynchronous routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
    pub queued: bool,
}

/// bridge.results.v1 - Collect results of submitted commands
#[derive(Debug, Default, Deserialize)]
pub struct ResultsRequest {
    /// Defaults to `DEFAULT_RESULTS_LIMIT`, capped at `MAX_RESULTS_LIMIT`
    pub limit: Option<usize>,
}

pub const DEFAULT_RESULTS_LIMIT: usize = 100;
pub const MAX_RESULTS_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub results: Vec<ResultEnvelope>,
}

/// queue.enqueue.v1 - Append an item to a named queue
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub queue: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub queue: String,
    pub pending: usize,
}

/// admin.stats.v1 - Queue, worker and gate statistics
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub queues: BTreeMap<String, usize>,
    pub workers: BTreeMap<String, WorkerStats>,
    pub readiness: ReadinessStats,
    pub integration_enabled: bool,
    pub uptime_seconds: i64,
}

/// admin.integration.v1 - Enable or disable the integration
#[derive(Debug, Deserialize)]
pub struct IntegrationRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationResponse {
    pub enabled: bool,
}
