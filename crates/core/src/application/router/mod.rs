//! Inbound command router
//!
//! Parses a command path under the configured namespace, matches it against a
//! fixed route table and invokes the host-supplied [`TaskHandlers`]. Every
//! failure, including a handler panic, becomes a [`RouteResult`]; `dispatch`
//! never fails.

mod path;
mod roots;
mod table;

pub use path::{parse_path, ParsedPath};
pub use roots::InMemoryRootTracker;
pub use table::{match_route, RouteKind, RouteMatch};

use crate::domain::{Method, ResultEnvelope, RouteRequest, RouteResult, TaskEnvelope};
use crate::port::{RootTracker, TaskError, TaskHandlers, TaskReply, TaskResult};
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default command namespace prefix
pub const DEFAULT_NAMESPACE: &str = "/nga/api/v1";

/// Default service identifier stamped on result envelopes
pub const DEFAULT_SERVICE_ID: &str = "conduit";

/// Query key of the job listing that disables parameters
const PARAMETERS_QUERY_KEY: &str = "parameters";

/// Query key of the branch listing filter
const FILTER_QUERY_KEY: &str = "filter";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub namespace: String,
    pub service_id: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
        }
    }
}

pub struct TaskRouter {
    config: RouterConfig,
    handlers: Arc<dyn TaskHandlers>,
    roots: Arc<dyn RootTracker>,
}

impl TaskRouter {
    pub fn new(
        config: RouterConfig,
        handlers: Arc<dyn TaskHandlers>,
        roots: Arc<dyn RootTracker>,
    ) -> Self {
        Self {
            config,
            handlers,
            roots,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a request to its handler and build the result
    pub async fn dispatch(&self, request: &RouteRequest) -> RouteResult {
        let parsed = match parse_path(&request.path, &self.config.namespace) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(method = %request.method, path = %request.path, "Rejected command: {}", e);
                return error_result(400, &e.to_string());
            }
        };

        let matched = match match_route(request.method, &parsed.segments) {
            Some(matched) => matched,
            None => {
                debug!(method = %request.method, path = %request.path, "No route");
                return RouteResult::empty(404);
            }
        };

        let invocation = self.invoke(&matched, &parsed, request.body.as_deref());
        let result = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(reply)) => {
                if matched.kind == RouteKind::GetPipeline {
                    self.roots.record_root(matched.param(0));
                }
                reply_result(reply)
            }
            Ok(Err(e)) => task_error_result(&matched, e),
            Err(_) => {
                error!(route = ?matched.kind, path = %request.path, "Handler panicked");
                error_result(500, "Handler panicked")
            }
        };

        debug!(
            method = %request.method,
            path = %request.path,
            route = ?matched.kind,
            status = result.status,
            "Command dispatched"
        );
        result
    }

    /// Dispatch an inbound envelope and wrap the result for the Server
    pub async fn dispatch_envelope(&self, envelope: TaskEnvelope) -> ResultEnvelope {
        let result = match envelope.method.parse::<Method>() {
            Ok(method) => {
                let request = RouteRequest {
                    method,
                    path: envelope.url,
                    headers: envelope.headers,
                    body: envelope.body,
                };
                self.dispatch(&request).await
            }
            Err(e) => {
                warn!(task_id = %envelope.id, "Rejected command: {}", e);
                error_result(400, &e.to_string())
            }
        };
        ResultEnvelope::from_result(envelope.id, self.config.service_id.clone(), result)
    }

    async fn invoke(
        &self,
        matched: &RouteMatch<'_>,
        parsed: &ParsedPath,
        body: Option<&str>,
    ) -> TaskResult {
        let handlers = &self.handlers;
        match matched.kind {
            RouteKind::Status => handlers.status().await,
            RouteKind::SuspendStatus => handlers.suspend_events(body).await,
            RouteKind::ListJobs => {
                let include_parameters = parsed.query_param(PARAMETERS_QUERY_KEY) != Some("false");
                handlers.list_jobs(include_parameters).await
            }
            RouteKind::GetPipeline => handlers.get_pipeline(matched.param(0)).await,
            RouteKind::RunPipeline => handlers.run_pipeline(matched.param(0), body).await,
            RouteKind::StopPipeline => handlers.stop_pipeline(matched.param(0), body).await,
            RouteKind::ListBranches => {
                let filter = parsed.query_param(FILTER_QUERY_KEY);
                handlers.list_branches(matched.param(0), filter).await
            }
            RouteKind::GetBuild => {
                handlers
                    .get_build(matched.param(0), matched.param(1))
                    .await
            }
            RouteKind::BulkBuildStatus => handlers.bulk_build_status(body).await,
            RouteKind::InitExecutor => handlers.init_executor(body).await,
            RouteKind::TestConnection => handlers.test_connection(body).await,
            RouteKind::UpsertCredentials => handlers.upsert_credentials(body).await,
            RouteKind::DeleteExecutor => handlers.delete_executor(matched.param(0)).await,
        }
    }
}

fn reply_result(reply: TaskReply) -> RouteResult {
    match reply.body {
        Some(body) => RouteResult::json(reply.status, &body),
        None => RouteResult::empty(reply.status),
    }
}

fn task_error_result(matched: &RouteMatch<'_>, error: TaskError) -> RouteResult {
    match error {
        TaskError::NotImplemented => {
            debug!(route = ?matched.kind, "Handler not implemented");
            RouteResult::empty(501)
        }
        TaskError::Status { code, message } => {
            warn!(route = ?matched.kind, code, "Handler failed: {}", message);
            RouteResult::json(code, &json!(code))
        }
        TaskError::Failed(message) => {
            error!(route = ?matched.kind, "Handler failed: {}", message);
            error_result(500, &message)
        }
    }
}

fn error_result(status: u16, message: &str) -> RouteResult {
    RouteResult::json(status, &json!({ "errorMessage": message }))
}
