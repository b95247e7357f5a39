//! Workflow execution engine
//!
//! Runs a workflow's steps strictly in order through a [`StepExecutor`],
//! recording a [`StepResult`] after every step. The first failing step halts
//! the run; there are no retries and no rollback.
//!
//! Lifecycle events are pushed to registered [`ExecutionObserver`]s
//! synchronously, in order, and also broadcast to any channel subscribers.
//!
//! # Example
//!
//! ```no_run
//! use stepflow::clock::SystemClock;
//! use stepflow::engine::ExecutionEngine;
//! use stepflow::executors::CapabilityRegistry;
//! use stepflow::models::{ExecuteOptions, Step, WorkflowDefinition};
//! use stepflow::registry::WorkflowRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = Arc::new(WorkflowRegistry::new());
//! registry.register(
//!     "greet",
//!     WorkflowDefinition::new("greet", "Greet", vec![Step::new("system", "echo")]),
//! )?;
//!
//! let engine = ExecutionEngine::new(
//!     registry,
//!     Arc::new(CapabilityRegistry::with_builtins()?),
//!     Arc::new(SystemClock),
//! );
//! let execution = engine.execute_workflow("greet", ExecuteOptions::default()).await?;
//! println!("{} -> {}", execution.id, execution.status);
//! # Ok(())
//! # }
//! ```

use crate::clock::Clock;
use crate::error::{Result, StepflowError};
use crate::executors::StepExecutor;
use crate::models::{ExecuteOptions, Execution, StepResult};
use crate::registry::WorkflowRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle events published by the engine
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Execution created in the running state
    Started(Execution),
    /// A step finished (successfully or not); `index` is its position in the workflow
    StepCompleted {
        execution_id: String,
        workflow_id: String,
        index: usize,
        step: StepResult,
    },
    /// All steps succeeded
    Completed(Execution),
    /// A step failed and the run was halted
    Failed(Execution),
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::Started(execution)
            | ExecutionEvent::Completed(execution)
            | ExecutionEvent::Failed(execution) => &execution.id,
            ExecutionEvent::StepCompleted { execution_id, .. } => execution_id,
        }
    }

    /// Final execution record for terminal events
    pub fn finished_execution(&self) -> Option<&Execution> {
        match self {
            ExecutionEvent::Completed(execution) | ExecutionEvent::Failed(execution) => {
                Some(execution)
            }
            _ => None,
        }
    }
}

/// Receives engine lifecycle events.
///
/// Observers are called inline on the executing task and should return quickly.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);

    /// Human-readable name for logging
    fn name(&self) -> &'static str {
        "ExecutionObserver"
    }
}

type ActiveExecutions = Mutex<HashMap<String, Execution>>;

/// Keeps an execution in the active set while its run is in progress.
///
/// If the run future is dropped before reaching a terminal state (caller
/// timeout, task abort), the last snapshot is failed as cancelled and a
/// `Failed` event is published, so every started execution ends exactly once.
struct ActiveGuard<'a> {
    engine: &'a ExecutionEngine,
    execution_id: String,
    finished: bool,
}

impl ActiveGuard<'_> {
    fn update(&self, execution: &Execution) {
        self.engine
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.execution_id.clone(), execution.clone());
    }

    /// The run reached a terminal state and publishes its own event
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let snapshot = self
            .engine
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.execution_id);

        if self.finished {
            return;
        }

        if let Some(mut execution) = snapshot {
            execution.fail(
                self.engine.clock.now(),
                "Execution cancelled before completion".to_string(),
            );
            warn!(
                "Execution {} of workflow '{}' cancelled after {} step(s)",
                execution.id,
                execution.workflow_id,
                execution.steps.len()
            );
            self.engine.publish(ExecutionEvent::Failed(execution));
        }
    }
}

/// Executes registered workflows
pub struct ExecutionEngine {
    registry: Arc<WorkflowRegistry>,
    executor: Arc<dyn StepExecutor>,
    clock: Arc<dyn Clock>,
    active: ActiveExecutions,
    observers: RwLock<Vec<Arc<dyn ExecutionObserver>>>,
    events: broadcast::Sender<ExecutionEvent>,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        executor: Arc<dyn StepExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            executor,
            clock,
            active: Mutex::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register an observer for all subsequent lifecycle events
    pub fn add_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        debug!("Adding execution observer '{}'", observer.name());
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Subscribe to lifecycle events over a broadcast channel.
    ///
    /// Slow receivers may observe `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Snapshots of executions currently running, oldest first
    pub fn list_active(&self) -> Vec<Execution> {
        let mut active: Vec<Execution> = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        active
    }

    /// Run a workflow to completion or first failure.
    ///
    /// # Errors
    ///
    /// * `StepflowError::WorkflowNotFound` - the id is not registered; nothing is recorded
    /// * `StepflowError::ExecutionFailed` - a step failed; the error carries the
    ///   failed execution including every step that ran
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        options: ExecuteOptions,
    ) -> Result<Execution> {
        // The definition is captured once; later re-registration does not affect this run
        let definition = self.registry.get(workflow_id)?;

        let mut execution = Execution::start(workflow_id, options, self.clock.now());
        let guard = ActiveGuard {
            engine: self,
            execution_id: execution.id.clone(),
            finished: false,
        };
        guard.update(&execution);

        info!(
            "Starting execution {} of workflow '{}' ({} steps)",
            execution.id,
            workflow_id,
            definition.steps.len()
        );
        self.publish(ExecutionEvent::Started(execution.clone()));

        for (index, step) in definition.steps.iter().enumerate() {
            debug!(
                "Execution {}: step {} ({}.{})",
                execution.id, index, step.target, step.action
            );

            let started = self.clock.now();
            let outcome = self.executor.execute(step).await;
            let ended = self.clock.now();

            let step_result = match outcome {
                Ok(value) => StepResult::succeeded(step, started, ended, value),
                Err(e) => StepResult::failed(step, started, ended, e.to_string()),
            };
            let failure = step_result.error.clone();

            execution.steps.push(step_result.clone());
            guard.update(&execution);
            self.publish(ExecutionEvent::StepCompleted {
                execution_id: execution.id.clone(),
                workflow_id: execution.workflow_id.clone(),
                index,
                step: step_result,
            });

            if let Some(message) = failure {
                execution.fail(self.clock.now(), message);
                guard.finish();

                error!(
                    "Execution {} of workflow '{}' failed at step {}: {}",
                    execution.id,
                    workflow_id,
                    index,
                    execution.error.as_deref().unwrap_or_default()
                );
                self.publish(ExecutionEvent::Failed(execution.clone()));
                return Err(StepflowError::ExecutionFailed(Box::new(execution)));
            }
        }

        execution.complete(self.clock.now());
        guard.finish();

        info!(
            "Execution {} of workflow '{}' completed in {}ms",
            execution.id,
            workflow_id,
            execution.duration_ms.unwrap_or_default()
        );
        self.publish(ExecutionEvent::Completed(execution.clone()));

        Ok(execution)
    }

    fn publish(&self, event: ExecutionEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer.on_event(&event);
        }

        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}
