// Domain Layer - Pure business logic and entities

pub mod error;
pub mod items;
pub mod outcome;
pub mod queue;
pub mod route;

// Re-exports
pub use error::DomainError;
pub use items::{AnalysisItem, CoverageItem};
pub use outcome::Outcome;
pub use queue::{ItemType, PersistenceMode, QueueDescriptor, QueueName, WorkItem};
pub use route::{Method, ResultEnvelope, RouteRequest, RouteResult, TaskEnvelope};
