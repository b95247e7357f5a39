//! Programmatic API over the engine, scheduler and analytics
//!
//! [`Orchestrator`] owns one instance of every component and wires the
//! metrics aggregator and audit history into the engine's observer list.
//! This is the surface a transport layer (HTTP, CLI) talks to.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::engine::{ExecutionEngine, ExecutionEvent};
use crate::error::Result;
use crate::executors::StepExecutor;
use crate::history::AuditHistory;
use crate::metrics::MetricsAggregator;
use crate::models::{
    Analytics, ExecuteOptions, Execution, Schedule, ScheduledWorkflow, WorkflowDefinition,
};
use crate::parser::WorkflowDocument;
use crate::registry::WorkflowRegistry;
use crate::scheduler::{Scheduler, TickSummary};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct Orchestrator {
    registry: Arc<WorkflowRegistry>,
    engine: Arc<ExecutionEngine>,
    scheduler: Arc<Scheduler>,
    metrics: Arc<MetricsAggregator>,
    history: Arc<AuditHistory>,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn StepExecutor>, config: &EngineConfig) -> Result<Self> {
        Self::with_clock(executor, config, Arc::new(SystemClock))
    }

    /// Build with an explicit time source; tests drive the scheduler with a manual clock
    pub fn with_clock(
        executor: Arc<dyn StepExecutor>,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(WorkflowRegistry::new());
        let engine = Arc::new(ExecutionEngine::new(registry.clone(), executor, clock));

        let metrics = Arc::new(MetricsAggregator::new()?);
        let history = Arc::new(AuditHistory::new(config.history_limit));
        engine.add_observer(metrics.clone());
        engine.add_observer(history.clone());

        let scheduler = Arc::new(Scheduler::new(engine.clone(), config.tick_interval()));

        Ok(Self {
            registry,
            engine,
            scheduler,
            metrics,
            history,
        })
    }

    pub fn register_workflow(
        &self,
        id: &str,
        definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>> {
        self.registry.register(id, definition)
    }

    /// Register under the definition's own id, generating one when it is empty
    pub fn register_new_workflow(&self, definition: WorkflowDefinition) -> Result<String> {
        self.registry.register_new(definition)
    }

    pub fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.registry.list()
    }

    pub fn get_workflow(&self, id: &str) -> Result<Arc<WorkflowDefinition>> {
        self.registry.get(id)
    }

    /// Remove a workflow and any schedule attached to it
    pub fn remove_workflow(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.scheduler.unschedule(id);
        self.registry.remove(id)
    }

    pub async fn execute_workflow(&self, id: &str, options: ExecuteOptions) -> Result<Execution> {
        self.engine.execute_workflow(id, options).await
    }

    pub fn schedule_workflow(&self, id: &str, schedule: Schedule) -> Result<ScheduledWorkflow> {
        self.scheduler.schedule_workflow(id, schedule)
    }

    pub fn unschedule_workflow(&self, id: &str) -> Option<ScheduledWorkflow> {
        self.scheduler.unschedule(id)
    }

    pub fn scheduled_workflows(&self) -> Vec<ScheduledWorkflow> {
        self.scheduler.scheduled()
    }

    /// Metrics snapshot plus the `recent` most recent finished executions, oldest first
    pub fn get_analytics(&self, recent: usize) -> Analytics {
        let metrics = self.metrics.snapshot();
        Analytics {
            success_rate: metrics.success_rate(),
            metrics,
            recent_executions: self.history.recent(recent),
        }
    }

    pub fn list_active_workflows(&self) -> Vec<Execution> {
        self.engine.list_active()
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.history.get(execution_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.engine.subscribe()
    }

    /// Prometheus text exposition of the execution metrics
    pub fn metrics_text(&self) -> Result<String> {
        self.metrics.render_prometheus()
    }

    /// Register every workflow of a parsed document, then install its schedules
    pub fn load_document(&self, document: WorkflowDocument) -> Result<()> {
        let workflow_count = document.workflows.len();
        for definition in document.workflows {
            let id = definition.id.clone();
            self.registry.register(&id, definition)?;
        }
        for entry in &document.schedules {
            self.scheduler
                .schedule_workflow(&entry.workflow_id, entry.schedule)?;
        }

        info!(
            "Loaded {} workflow(s) and {} schedule(s)",
            workflow_count,
            document.schedules.len()
        );
        Ok(())
    }

    /// Run one scheduler evaluation immediately
    pub async fn tick(&self) -> TickSummary {
        self.scheduler.tick().await
    }

    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
