//! Error types for Stepflow

use crate::models::Execution;
use thiserror::Error;

/// Stepflow error types
#[derive(Error, Debug)]
pub enum StepflowError {
    /// Workflow id is not present in the registry
    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// No capability is registered for a step's target/action pair
    #[error("Unknown capability '{target}.{action}'")]
    UnknownCapability { target: String, action: String },

    /// The capability ran but reported failure
    #[error("Step '{target}.{action}' failed: {message}")]
    StepExecutionFailure {
        target: String,
        action: String,
        message: String,
    },

    /// Invalid schedule passed to the scheduler
    #[error("Invalid schedule: {0}")]
    SchedulerConfiguration(String),

    /// Overall execution failure, carrying the execution record with the steps that ran
    #[error("{}", describe_failure(.0))]
    ExecutionFailed(Box<Execution>),

    /// Structural validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// YAML parsing errors
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// YAML size exceeded limit
    #[error("Workflow YAML exceeds 1MB limit (size: {0} bytes)")]
    YamlSizeExceeded(usize),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Prometheus registry errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path validation errors
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path traversal attempt
    #[error("Path traversal detected in: {0}")]
    PathTraversal(String),

    /// HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl StepflowError {
    /// Execution record attached to a failed run, if any
    pub fn execution(&self) -> Option<&Execution> {
        match self {
            StepflowError::ExecutionFailed(execution) => Some(execution),
            _ => None,
        }
    }
}

fn describe_failure(execution: &Execution) -> String {
    format!(
        "Execution '{}' of workflow '{}' failed: {}",
        execution.id,
        execution.workflow_id,
        execution.error.as_deref().unwrap_or("unknown error")
    )
}

/// Result type alias using StepflowError
pub type Result<T> = std::result::Result<T, StepflowError>;
