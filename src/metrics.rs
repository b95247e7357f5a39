//! Execution metrics
//!
//! [`MetricsAggregator`] keeps the running counters reported through the
//! analytics API and mirrors them into Prometheus collectors:
//!
//! - `stepflow_workflow_executions_total{workflow, status}` - Counter of finished executions
//! - `stepflow_step_executions_total{target, action, status}` - Counter of finished steps
//! - `stepflow_step_duration_seconds{target, action}` - Histogram of step durations
//! - `stepflow_active_executions` - Gauge of currently running executions
//!
//! The average execution time is updated incrementally from the previous
//! average, so each record is O(1) regardless of history size.

use crate::engine::{ExecutionEvent, ExecutionObserver};
use crate::error::{Result, StepflowError};
use crate::models::{Execution, ExecutionStatus, Metrics};
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Histogram bucket boundaries for step duration metrics (in seconds)
const STEP_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Running counters over finished executions
pub struct MetricsAggregator {
    state: Mutex<Metrics>,
    registry: Registry,
    workflow_executions: CounterVec,
    step_executions: CounterVec,
    step_duration: HistogramVec,
    active_executions: Gauge,
}

impl MetricsAggregator {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let workflow_executions = CounterVec::new(
            Opts::new(
                "stepflow_workflow_executions_total",
                "Total number of finished workflow executions",
            ),
            &["workflow", "status"],
        )?;

        let step_executions = CounterVec::new(
            Opts::new(
                "stepflow_step_executions_total",
                "Total number of finished steps",
            ),
            &["target", "action", "status"],
        )?;

        let step_duration = HistogramVec::new(
            HistogramOpts::new(
                "stepflow_step_duration_seconds",
                "Step execution duration in seconds",
            )
            .buckets(STEP_DURATION_BUCKETS.to_vec()),
            &["target", "action"],
        )?;

        let active_executions = Gauge::with_opts(Opts::new(
            "stepflow_active_executions",
            "Currently running executions",
        ))?;

        registry.register(Box::new(workflow_executions.clone()))?;
        registry.register(Box::new(step_executions.clone()))?;
        registry.register(Box::new(step_duration.clone()))?;
        registry.register(Box::new(active_executions.clone()))?;

        Ok(Self {
            state: Mutex::new(Metrics::default()),
            registry,
            workflow_executions,
            step_executions,
            step_duration,
            active_executions,
        })
    }

    /// Fold a finished execution into the counters
    pub fn record(&self, execution: &Execution) {
        let mut metrics = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match execution.status {
            ExecutionStatus::Running => {
                warn!(
                    "Ignoring metrics for execution {} which is still running",
                    execution.id
                );
                return;
            }
            ExecutionStatus::Completed => {
                metrics.successful_workflows += 1;
                let n = metrics.successful_workflows as f64;
                let duration = execution.duration_ms.unwrap_or_default() as f64;
                metrics.average_execution_time =
                    (metrics.average_execution_time * (n - 1.0) + duration) / n;
            }
            ExecutionStatus::Failed => metrics.failed_workflows += 1,
        }
        metrics.total_workflows += 1;

        debug!(
            "Metrics updated: total={} ok={} failed={} avg={:.1}ms",
            metrics.total_workflows,
            metrics.successful_workflows,
            metrics.failed_workflows,
            metrics.average_execution_time
        );

        let status = execution.status.to_string();
        self.workflow_executions
            .with_label_values(&[execution.workflow_id.as_str(), status.as_str()])
            .inc();
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> Metrics {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_executions(&self) -> f64 {
        self.active_executions.get()
    }

    /// Prometheus text exposition of all collectors
    pub fn render_prometheus(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| StepflowError::Other(e.to_string()))
    }
}

impl ExecutionObserver for MetricsAggregator {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::Started(_) => self.active_executions.inc(),
            ExecutionEvent::StepCompleted { step, .. } => {
                let status = if step.success { "success" } else { "failed" };
                self.step_executions
                    .with_label_values(&[step.target.as_str(), step.action.as_str(), status])
                    .inc();
                self.step_duration
                    .with_label_values(&[step.target.as_str(), step.action.as_str()])
                    .observe(step.duration_ms().max(0) as f64 / 1000.0);
            }
            ExecutionEvent::Completed(execution) | ExecutionEvent::Failed(execution) => {
                self.active_executions.dec();
                self.record(execution);
            }
        }
    }

    fn name(&self) -> &'static str {
        "MetricsAggregator"
    }
}
