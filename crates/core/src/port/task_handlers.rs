// Task Handlers Port (host-supplied command handlers)

use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a host handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Capability not supported by the host (501)
    #[error("Not implemented")]
    NotImplemented,

    /// Caller-classified failure with an explicit status code
    #[error("Status {code}: {message}")]
    Status { code: u16, message: String },

    /// Any other failure (500)
    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        TaskError::Status {
            code,
            message: message.into(),
        }
    }
}

impl From<AppError> for TaskError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => TaskError::Status {
                code: 404,
                message: msg,
            },
            AppError::Validation(msg) => TaskError::Status {
                code: 400,
                message: msg,
            },
            other => TaskError::Failed(other.to_string()),
        }
    }
}

/// Successful handler reply
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReply {
    pub status: u16,
    pub body: Option<Value>,
}

impl TaskReply {
    /// 200 with a JSON body
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    /// 200 without a body
    pub fn empty() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    /// 201 without a body
    pub fn created() -> Self {
        Self {
            status: 201,
            body: None,
        }
    }
}

pub type TaskResult = std::result::Result<TaskReply, TaskError>;

/// Host-supplied handlers for remote-initiated commands
///
/// Every method defaults to `NotImplemented`; hosts override what they support.
#[async_trait]
pub trait TaskHandlers: Send + Sync {
    /// GET status
    async fn status(&self) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// PUT suspend_status
    async fn suspend_events(&self, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// GET jobs
    async fn list_jobs(&self, _include_parameters: bool) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// GET jobs/{id} (pipeline definition)
    async fn get_pipeline(&self, _job_id: &str) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// POST jobs/{id}/run
    async fn run_pipeline(&self, _job_id: &str, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// POST jobs/{id}/stop
    async fn stop_pipeline(&self, _job_id: &str, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// GET jobs/{id}/branches
    async fn list_branches(&self, _job_id: &str, _filter: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// GET jobs/{id}/builds/{build}
    async fn get_build(&self, _job_id: &str, _build_id: &str) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// POST builds/status
    async fn bulk_build_status(&self, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// POST executor/init
    async fn init_executor(&self, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// POST executor/test/connection
    async fn test_connection(&self, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// POST executor/credentials
    async fn upsert_credentials(&self, _body: Option<&str>) -> TaskResult {
        Err(TaskError::NotImplemented)
    }

    /// DELETE executor/{id}
    async fn delete_executor(&self, _executor_id: &str) -> TaskResult {
        Err(TaskError::NotImplemented)
    }
}

/// Tracks root jobs / pipeline roots (owned by a collaborator service)
pub trait RootTracker: Send + Sync {
    fn record_root(&self, job_id: &str);
}
