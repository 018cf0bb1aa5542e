//! Host handlers for routed commands
//!
//! The job listing is read from the inventory file through the
//! RefreshableCache; everything this host does not support keeps the
//! default 501 reply.

use async_trait::async_trait;
use conduit_api_rpc::handler::ToggleHook;
use conduit_core::application::{EnabledFlag, QueueRegistry, Reachability, RefreshableCache};
use conduit_core::error::{AppError, Result};
use conduit_core::port::{TaskError, TaskHandlers, TaskReply, TaskResult};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub type JobList = Arc<Vec<Value>>;

/// Job definitions kept in a JSON file (array of objects with an `id`)
#[derive(Debug, Clone)]
pub struct JobInventory {
    path: Option<PathBuf>,
}

impl JobInventory {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Read the inventory; no configured file means no jobs
    pub async fn load(&self) -> Result<JobList> {
        let Some(path) = &self.path else {
            return Ok(Arc::new(Vec::new()));
        };

        let raw = tokio::fs::read(path).await?;
        let jobs = match serde_json::from_slice::<Value>(&raw)? {
            Value::Array(jobs) => jobs,
            _ => {
                return Err(AppError::Validation(format!(
                    "{} must contain a JSON array of jobs",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), jobs = jobs.len(), "Job inventory loaded");
        Ok(Arc::new(jobs))
    }
}

/// Turns the integration on or off together with the job cache
///
/// Both the remote suspend command and the RPC toggle go through here.
#[derive(Clone)]
pub struct IntegrationSwitch {
    flag: Arc<EnabledFlag>,
    jobs: Arc<RefreshableCache<JobList>>,
    /// Caching as configured; the cache only runs while the integration is on
    cache_enabled: bool,
}

impl IntegrationSwitch {
    pub fn new(
        flag: Arc<EnabledFlag>,
        jobs: Arc<RefreshableCache<JobList>>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            flag,
            jobs,
            cache_enabled,
        }
    }

    pub fn set(&self, enabled: bool) {
        self.flag.set_enabled(enabled);
        self.jobs.set_enabled(enabled && self.cache_enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.is_enabled()
    }

    /// Hook for the RPC toggle
    pub fn hook(&self) -> ToggleHook {
        let switch = self.clone();
        Arc::new(move |enabled| switch.set(enabled))
    }
}

pub struct DaemonTaskHandlers {
    service_id: String,
    registry: Arc<QueueRegistry>,
    integration: IntegrationSwitch,
    reachability: Arc<Reachability>,
    jobs: Arc<RefreshableCache<JobList>>,
    started_at: Instant,
}

impl DaemonTaskHandlers {
    pub fn new(
        service_id: impl Into<String>,
        registry: Arc<QueueRegistry>,
        integration: IntegrationSwitch,
        reachability: Arc<Reachability>,
        jobs: Arc<RefreshableCache<JobList>>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            registry,
            integration,
            reachability,
            jobs,
            started_at: Instant::now(),
        }
    }

    async fn find_job(&self, job_id: &str) -> std::result::Result<Value, TaskError> {
        let jobs = self.jobs.get_or_compute().await?;
        jobs.iter()
            .find(|job| job.get("id").and_then(Value::as_str) == Some(job_id))
            .cloned()
            .ok_or_else(|| TaskError::status(404, format!("Job {} not found", job_id)))
    }
}

#[async_trait]
impl TaskHandlers for DaemonTaskHandlers {
    async fn status(&self) -> TaskResult {
        let queues = self.registry.sizes().await?;
        Ok(TaskReply::json(json!({
            "serviceId": self.service_id,
            "version": conduit_core::VERSION,
            "integrationEnabled": self.integration.is_enabled(),
            "serverReachable": self.reachability.is_reachable(),
            "queues": queues,
            "uptimeSeconds": self.started_at.elapsed().as_secs(),
        })))
    }

    /// Body `{"suspended": bool}` pauses or resumes the push queues
    async fn suspend_events(&self, body: Option<&str>) -> TaskResult {
        let suspended = body
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|value| value.get("suspended").and_then(Value::as_bool))
            .ok_or_else(|| TaskError::status(400, "Body must be {\"suspended\": bool}"))?;

        self.integration.set(!suspended);
        info!(suspended, "Event pushes suspended by remote command");
        Ok(TaskReply::json(json!({ "suspended": suspended })))
    }

    async fn list_jobs(&self, include_parameters: bool) -> TaskResult {
        let jobs = self.jobs.get_or_compute().await?;
        let listed: Vec<Value> = jobs
            .iter()
            .map(|job| {
                let mut job = job.clone();
                if !include_parameters {
                    if let Some(fields) = job.as_object_mut() {
                        fields.remove("parameters");
                    }
                }
                job
            })
            .collect();
        Ok(TaskReply::json(Value::Array(listed)))
    }

    async fn get_pipeline(&self, job_id: &str) -> TaskResult {
        Ok(TaskReply::json(self.find_job(job_id).await?))
    }

    async fn list_branches(&self, job_id: &str, filter: Option<&str>) -> TaskResult {
        let job = self.find_job(job_id).await?;
        let branches: Vec<Value> = job
            .get("branches")
            .and_then(Value::as_array)
            .map(|branches| {
                branches
                    .iter()
                    .filter(|branch| match (filter, branch.as_str()) {
                        (Some(filter), Some(name)) => name.contains(filter),
                        _ => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(TaskReply::json(Value::Array(branches)))
    }
}
