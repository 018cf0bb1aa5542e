// Push producers for the built-in queues

use crate::application::queue::QueueRegistry;
use crate::domain::{
    AnalysisItem, CoverageItem, ItemType, Method, PersistenceMode, QueueDescriptor, QueueName,
    TaskEnvelope,
};
use crate::error::{AppError, Result};
use std::sync::Arc;
use tracing::info;

/// Coverage report pushes
pub const COVERAGE_QUEUE: &str = "coverage-push";
/// Static-analysis result pushes
pub const ANALYSIS_QUEUE: &str = "analysis-push";
/// Remote-initiated commands queued for asynchronous routing
pub const TASK_QUEUE: &str = "tasks";
/// Routed results of queued commands, awaiting pickup by the host
pub const TASK_RESULT_QUEUE: &str = "task-results";

/// Descriptor for one of the built-in queues
///
/// `task-results` is always transient; the others follow `mode`.
pub fn builtin_descriptor(name: &str, mode: PersistenceMode) -> Result<QueueDescriptor> {
    let item_type = match name {
        COVERAGE_QUEUE => "coverage",
        ANALYSIS_QUEUE => "analysis",
        TASK_QUEUE => "task",
        TASK_RESULT_QUEUE => {
            return Ok(QueueDescriptor::transient(
                QueueName::new(name)?,
                ItemType::new("task-result"),
            ))
        }
        other => {
            return Err(AppError::NotFound(format!("Unknown built-in queue {}", other)));
        }
    };
    Ok(QueueDescriptor::new(
        QueueName::new(name)?,
        mode,
        ItemType::new(item_type),
    ))
}

/// Validating producer API for the push queues
///
/// Enqueue is fire-and-forget: a returned `Ok` means the item is stored; a
/// failed append is returned to the caller.
pub struct PushService {
    registry: Arc<QueueRegistry>,
    coverage: QueueName,
    analysis: QueueName,
    tasks: QueueName,
}

impl PushService {
    pub fn new(registry: Arc<QueueRegistry>) -> Result<Self> {
        Ok(Self {
            registry,
            coverage: QueueName::new(COVERAGE_QUEUE)?,
            analysis: QueueName::new(ANALYSIS_QUEUE)?,
            tasks: QueueName::new(TASK_QUEUE)?,
        })
    }

    pub async fn enqueue_coverage(&self, item: &CoverageItem) -> Result<()> {
        require("job_id", &item.job_id)?;
        require("build_id", &item.build_id)?;
        require("report_file", &item.report_file)?;

        self.registry.enqueue(&self.coverage, item).await?;
        info!(
            job_id = %item.job_id,
            build_id = %item.build_id,
            report_type = %item.report_type,
            "Coverage push queued"
        );
        Ok(())
    }

    pub async fn enqueue_analysis(&self, item: &AnalysisItem) -> Result<()> {
        require("job_id", &item.job_id)?;
        require("build_id", &item.build_id)?;
        require("project_key", &item.project_key)?;

        self.registry.enqueue(&self.analysis, item).await?;
        info!(
            job_id = %item.job_id,
            build_id = %item.build_id,
            project_key = %item.project_key,
            "Analysis push queued"
        );
        Ok(())
    }

    pub async fn enqueue_task(&self, envelope: &TaskEnvelope) -> Result<()> {
        require("id", &envelope.id)?;
        require("url", &envelope.url)?;
        envelope.method.parse::<Method>()?;

        self.registry.enqueue(&self.tasks, envelope).await?;
        info!(task_id = %envelope.id, method = %envelope.method, "Task queued");
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::TransientOnly;
    use crate::port::time_provider::mocks::ManualTimeProvider;

    async fn service() -> (PushService, Arc<QueueRegistry>) {
        let registry = Arc::new(QueueRegistry::new(
            Arc::new(TransientOnly),
            Arc::new(ManualTimeProvider::new(0)),
        ));
        for name in [COVERAGE_QUEUE, ANALYSIS_QUEUE, TASK_QUEUE] {
            registry
                .open(builtin_descriptor(name, PersistenceMode::Transient).unwrap())
                .await
                .unwrap();
        }
        (PushService::new(registry.clone()).unwrap(), registry)
    }

    fn coverage(job_id: &str) -> CoverageItem {
        CoverageItem {
            job_id: job_id.to_string(),
            build_id: "42".to_string(),
            report_file: "jacoco.xml".to_string(),
            report_type: "JACOCOXML".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_coverage() {
        let (service, registry) = service().await;
        service.enqueue_coverage(&coverage("job-a")).await.unwrap();
        assert_eq!(registry.sizes().await.unwrap()[COVERAGE_QUEUE], 1);
    }

    #[tokio::test]
    async fn test_missing_field_rejected() {
        let (service, registry) = service().await;
        let err = service.enqueue_coverage(&coverage(" ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(registry.sizes().await.unwrap()[COVERAGE_QUEUE], 0);
    }

    #[tokio::test]
    async fn test_task_with_bad_method_rejected() {
        let (service, _) = service().await;
        let envelope = TaskEnvelope {
            id: "t-1".to_string(),
            method: "PATCH".to_string(),
            url: "/nga/api/v1/status".to_string(),
            headers: Default::default(),
            body: None,
        };
        assert!(matches!(
            service.enqueue_task(&envelope).await,
            Err(AppError::Domain(_))
        ));
    }

    #[tokio::test]
    async fn test_unopened_queue_is_caller_visible() {
        let registry = Arc::new(QueueRegistry::new(
            Arc::new(TransientOnly),
            Arc::new(ManualTimeProvider::new(0)),
        ));
        let service = PushService::new(registry).unwrap();
        let item = AnalysisItem {
            job_id: "job-a".to_string(),
            build_id: "1".to_string(),
            project_key: "proj".to_string(),
            server_url: "http://sonar".to_string(),
        };
        assert!(matches!(
            service.enqueue_analysis(&item).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_result_queue_is_transient() {
        let descriptor = builtin_descriptor(TASK_RESULT_QUEUE, PersistenceMode::Durable).unwrap();
        assert_eq!(descriptor.mode, PersistenceMode::Transient);
        assert!(builtin_descriptor("other", PersistenceMode::Durable).is_err());
    }
}
