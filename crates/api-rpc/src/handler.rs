//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    EnqueueRequest, EnqueueResponse, IntegrationRequest, IntegrationResponse, ResultsRequest,
    ResultsResponse, StatsResponse, SubmitResponse, DEFAULT_RESULTS_LIMIT, MAX_RESULTS_LIMIT,
};
use conduit_core::application::push::{ANALYSIS_QUEUE, COVERAGE_QUEUE, TASK_QUEUE};
use conduit_core::application::{
    EnabledFlag, PushService, QueueRegistry, QueueResultSink, ReadinessGate, TaskRouter,
    WorkerMonitor,
};
use conduit_core::domain::{AnalysisItem, CoverageItem, QueueName, ResultEnvelope, TaskEnvelope};
use conduit_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Callback run after the integration is toggled (e.g. cache enable/disable)
pub type ToggleHook = Arc<dyn Fn(bool) + Send + Sync>;

/// Dependencies of the RPC handler, wired by the daemon
pub struct RpcDeps {
    pub router: Arc<TaskRouter>,
    pub push: Arc<PushService>,
    /// Where the `tasks` worker publishes routed results
    pub results: Arc<QueueResultSink>,
    pub registry: Arc<QueueRegistry>,
    pub gate: Arc<ReadinessGate>,
    pub integration: Arc<EnabledFlag>,
    pub workers: BTreeMap<String, WorkerMonitor>,
    pub on_toggle: Option<ToggleHook>,
}

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    deps: RpcDeps,
    rate_limiter: RateLimiter,
    start_time: std::time::Instant,
}

impl RpcHandler {
    /// # Arguments
    /// * `deps` - Core services
    /// * `rate_limit_burst` / `rate_limit_rate` - Token bucket size and refill per second
    pub fn new(deps: RpcDeps, rate_limit_burst: u32, rate_limit_rate: u32) -> Self {
        Self {
            deps,
            rate_limiter: RateLimiter::new(rate_limit_burst, rate_limit_rate),
            start_time: std::time::Instant::now(),
        }
    }

    fn throttle(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check() {
            Ok(())
        } else {
            Err(throttled())
        }
    }

    /// bridge.dispatch.v1
    pub async fn dispatch(&self, envelope: TaskEnvelope) -> Result<ResultEnvelope, ErrorObjectOwned> {
        self.throttle()?;
        Ok(self.deps.router.dispatch_envelope(envelope).await)
    }

    /// bridge.submit.v1
    pub async fn submit(&self, envelope: TaskEnvelope) -> Result<SubmitResponse, ErrorObjectOwned> {
        self.throttle()?;
        self.deps
            .push
            .enqueue_task(&envelope)
            .await
            .map_err(to_rpc_error)?;
        Ok(SubmitResponse {
            id: envelope.id,
            queued: true,
        })
    }

    /// bridge.results.v1
    pub async fn results(&self, params: ResultsRequest) -> Result<ResultsResponse, ErrorObjectOwned> {
        self.throttle()?;
        let limit = params
            .limit
            .unwrap_or(DEFAULT_RESULTS_LIMIT)
            .min(MAX_RESULTS_LIMIT);
        let results = self.deps.results.take(limit).await.map_err(to_rpc_error)?;
        Ok(ResultsResponse { results })
    }

    /// queue.enqueue.v1
    ///
    /// Built-in push queues validate their item shape; other queues take the
    /// payload as is.
    pub async fn enqueue(&self, params: EnqueueRequest) -> Result<EnqueueResponse, ErrorObjectOwned> {
        self.throttle()?;

        let name = QueueName::new(params.queue.as_str())
            .map_err(|e| to_rpc_error(AppError::from(e)))?;
        let push = &self.deps.push;
        let result = match name.as_str() {
            COVERAGE_QUEUE => match serde_json::from_value::<CoverageItem>(params.payload) {
                Ok(item) => push.enqueue_coverage(&item).await,
                Err(e) => Err(AppError::from(e)),
            },
            ANALYSIS_QUEUE => match serde_json::from_value::<AnalysisItem>(params.payload) {
                Ok(item) => push.enqueue_analysis(&item).await,
                Err(e) => Err(AppError::from(e)),
            },
            TASK_QUEUE => match serde_json::from_value::<TaskEnvelope>(params.payload) {
                Ok(envelope) => push.enqueue_task(&envelope).await,
                Err(e) => Err(AppError::from(e)),
            },
            _ => self.deps.registry.enqueue_raw(&name, params.payload).await,
        };
        result.map_err(to_rpc_error)?;

        let pending = match self.deps.registry.get(&name) {
            Some(queue) => queue.size().await.map_err(to_rpc_error)?,
            None => 0,
        };
        Ok(EnqueueResponse {
            queue: name.to_string(),
            pending,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> Result<StatsResponse, ErrorObjectOwned> {
        let queues = self.deps.registry.sizes().await.map_err(to_rpc_error)?;
        let workers = self
            .deps
            .workers
            .iter()
            .map(|(name, monitor)| (name.clone(), monitor.stats()))
            .collect();

        Ok(StatsResponse {
            queues,
            workers,
            readiness: self.deps.gate.stats(),
            integration_enabled: self.deps.integration.is_enabled(),
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// admin.integration.v1
    pub async fn set_integration(
        &self,
        params: IntegrationRequest,
    ) -> Result<IntegrationResponse, ErrorObjectOwned> {
        self.throttle()?;

        self.deps.integration.set_enabled(params.enabled);
        if let Some(hook) = &self.deps.on_toggle {
            hook(params.enabled);
        }
        info!(enabled = params.enabled, "Integration toggled over RPC");

        Ok(IntegrationResponse {
            enabled: self.deps.integration.is_enabled(),
        })
    }
}
