// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("Invalid route path: {0}")]
    InvalidPath(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
