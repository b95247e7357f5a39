//! Core data models for the Stepflow engine

use crate::error::{Result, StepflowError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Input validation limits
pub const MAX_YAML_SIZE: usize = 1_048_576; // 1 MB
pub const MAX_WORKFLOW_COUNT: usize = 1_000;
pub const MAX_STEP_COUNT: usize = 1_000;
pub const MAX_WORKFLOW_ID_LEN: usize = 64;
pub const MAX_COMMAND_LEN: usize = 4_096; // 4 KB
pub const MAX_ARG_COUNT: usize = 256;
pub const MAX_ARG_LEN: usize = 4_096; // 4 KB
pub const MAX_OUTPUT_SIZE: usize = 10_485_760; // 10 MB
pub const MAX_RESPONSE_SIZE: usize = 10_485_760; // 10 MB

/// Upper bound for custom schedule intervals (one year)
pub const MAX_CUSTOM_INTERVAL_MS: u64 = 366 * 86_400_000;

/// Step parameters, passed opaquely to the capability
pub type StepParams = Map<String, Value>;

/// A single unit of work, dispatched by its target/action pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub params: StepParams,
}

impl Step {
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            params: StepParams::new(),
        }
    }

    /// Attach a parameter, builder style
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Named, ordered sequence of steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            steps,
        }
    }

    /// Check structural shape: every step names a target and an action
    pub fn validate_shape(&self) -> Result<()> {
        if self.steps.len() > MAX_STEP_COUNT {
            return Err(StepflowError::Validation(format!(
                "Workflow '{}' has {} steps, limit is {}",
                self.id,
                self.steps.len(),
                MAX_STEP_COUNT
            )));
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.target.trim().is_empty() || step.action.trim().is_empty() {
                return Err(StepflowError::Validation(format!(
                    "Workflow '{}' step {} must define both target and action",
                    self.id, index
                )));
            }
        }

        Ok(())
    }
}

/// Execution lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What started an execution
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTrigger {
    #[default]
    Manual,
    Scheduled,
}

/// Caller options for a single execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub trigger: ExecutionTrigger,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExecuteOptions {
    pub fn scheduled() -> Self {
        Self {
            trigger: ExecutionTrigger::Scheduled,
            metadata: Map::new(),
        }
    }
}

/// Outcome of one step within an execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub target: String,
    pub action: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn succeeded(
        step: &Step,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        result: Value,
    ) -> Self {
        Self {
            target: step.target.clone(),
            action: step.action.clone(),
            start_time,
            end_time,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(
        step: &Step,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            target: step.target.clone(),
            action: step.action.clone(),
            start_time,
            end_time,
            success: false,
            result: None,
            error: Some(error),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// One runtime instance of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: ExecutionStatus,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub trigger: ExecutionTrigger,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Execution {
    /// New execution in the running state with a fresh id
    pub fn start(workflow_id: &str, options: ExecuteOptions, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            start_time: now,
            end_time: None,
            duration_ms: None,
            status: ExecutionStatus::Running,
            steps: Vec::new(),
            error: None,
            trigger: options.trigger,
            metadata: options.metadata,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != ExecutionStatus::Running
    }

    /// Transition running -> completed
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.finish(ExecutionStatus::Completed, now);
    }

    /// Transition running -> failed
    pub fn fail(&mut self, now: DateTime<Utc>, message: String) {
        self.error = Some(message);
        self.finish(ExecutionStatus::Failed, now);
    }

    fn finish(&mut self, status: ExecutionStatus, now: DateTime<Utc>) {
        debug_assert!(!self.is_finished(), "execution finished twice");
        let end_time = now.max(self.start_time);
        self.status = status;
        self.end_time = Some(end_time);
        self.duration_ms = Some((end_time - self.start_time).num_milliseconds());
    }
}

/// Schedule kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Daily,
    Hourly,
    Weekly,
    Custom,
}

/// Recurrence rule for a scheduled workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl Schedule {
    pub fn daily() -> Self {
        Self {
            schedule_type: ScheduleType::Daily,
            interval_ms: None,
        }
    }

    pub fn hourly() -> Self {
        Self {
            schedule_type: ScheduleType::Hourly,
            interval_ms: None,
        }
    }

    pub fn weekly() -> Self {
        Self {
            schedule_type: ScheduleType::Weekly,
            interval_ms: None,
        }
    }

    pub fn custom(interval_ms: u64) -> Self {
        Self {
            schedule_type: ScheduleType::Custom,
            interval_ms: Some(interval_ms),
        }
    }

    /// Period between runs. Custom schedules without an interval run hourly.
    pub fn interval(&self) -> Duration {
        match self.schedule_type {
            ScheduleType::Daily => Duration::hours(24),
            ScheduleType::Hourly => Duration::hours(1),
            ScheduleType::Weekly => Duration::days(7),
            ScheduleType::Custom => match self.interval_ms {
                Some(ms) => Duration::milliseconds(ms.min(MAX_CUSTOM_INTERVAL_MS) as i64),
                None => Duration::hours(1),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (self.schedule_type, self.interval_ms) {
            (ScheduleType::Custom, Some(0)) => Err(StepflowError::SchedulerConfiguration(
                "custom interval must be greater than zero".to_string(),
            )),
            (ScheduleType::Custom, Some(ms)) if ms > MAX_CUSTOM_INTERVAL_MS => {
                Err(StepflowError::SchedulerConfiguration(format!(
                    "custom interval {}ms exceeds limit of {}ms",
                    ms, MAX_CUSTOM_INTERVAL_MS
                )))
            }
            (ScheduleType::Custom, _) => Ok(()),
            (_, Some(_)) => Err(StepflowError::SchedulerConfiguration(format!(
                "interval_ms is only valid for custom schedules, got {:?}",
                self.schedule_type
            ))),
            (_, None) => Ok(()),
        }
    }
}

/// Scheduler entry for one workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledWorkflow {
    pub workflow_id: String,
    pub schedule: Schedule,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

/// Running execution counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    pub total_workflows: u64,
    pub successful_workflows: u64,
    pub failed_workflows: u64,
    /// Mean duration in milliseconds over successful executions
    pub average_execution_time: f64,
}

impl Metrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_workflows == 0 {
            0.0
        } else {
            self.successful_workflows as f64 / self.total_workflows as f64
        }
    }
}

/// Analytics view returned to API consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub metrics: Metrics,
    pub success_rate: f64,
    pub recent_executions: Vec<Execution>,
}
