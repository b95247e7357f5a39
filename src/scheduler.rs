//! Interval-based workflow scheduler
//!
//! Each workflow has at most one [`ScheduledWorkflow`] entry. A tick compares
//! the clock against every entry's `next_run` and triggers the due ones, so a
//! late tick never accumulates drift: the next run is always computed from
//! the tick's own "now".
//!
//! The background loop is owned by the scheduler and stopped through a watch
//! channel; [`Scheduler::shutdown`] is idempotent.
//!
//! # Example
//!
//! ```no_run
//! use stepflow::models::Schedule;
//! use stepflow::scheduler::Scheduler;
//! use std::sync::Arc;
//!
//! # async fn example(scheduler: Arc<Scheduler>) -> anyhow::Result<()> {
//! scheduler.schedule_workflow("nightly-backup", Schedule::daily())?;
//! scheduler.start()?;
//! // ...
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::clock::Clock;
use crate::engine::ExecutionEngine;
use crate::error::{Result, StepflowError};
use crate::models::{ExecuteOptions, Schedule, ScheduledWorkflow};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Next trigger time for `schedule` evaluated at `now`
pub fn calculate_next_run(schedule: &Schedule, now: DateTime<Utc>) -> DateTime<Utc> {
    now + schedule.interval()
}

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub triggered: usize,
    pub succeeded: usize,
    pub failed: usize,
}

enum LoopState {
    Idle,
    Running {
        shutdown_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Triggers scheduled workflows through the execution engine
pub struct Scheduler {
    engine: Arc<ExecutionEngine>,
    entries: Mutex<BTreeMap<String, ScheduledWorkflow>>,
    tick_interval: Duration,
    state: Mutex<LoopState>,
    /// Held shared by every tick; shutdown takes it exclusively to drain them
    tick_gate: RwLock<()>,
}

impl Scheduler {
    pub fn new(engine: Arc<ExecutionEngine>, tick_interval: Duration) -> Self {
        Self {
            engine,
            entries: Mutex::new(BTreeMap::new()),
            tick_interval,
            state: Mutex::new(LoopState::Idle),
            tick_gate: RwLock::new(()),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.engine.clock()
    }

    /// Schedule a registered workflow, replacing any existing entry for it
    ///
    /// # Errors
    ///
    /// * `StepflowError::WorkflowNotFound` - the workflow is not registered
    /// * `StepflowError::SchedulerConfiguration` - the schedule is invalid
    pub fn schedule_workflow(
        &self,
        workflow_id: &str,
        schedule: Schedule,
    ) -> Result<ScheduledWorkflow> {
        if !self.engine.registry().contains(workflow_id) {
            return Err(StepflowError::WorkflowNotFound(workflow_id.to_string()));
        }
        schedule.validate()?;

        let entry = ScheduledWorkflow {
            workflow_id: workflow_id.to_string(),
            schedule,
            next_run: calculate_next_run(&schedule, self.clock().now()),
            last_run: None,
            run_count: 0,
        };

        info!(
            "Scheduled workflow '{}' ({:?}), next run at {}",
            workflow_id, schedule.schedule_type, entry.next_run
        );

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow_id.to_string(), entry.clone());

        Ok(entry)
    }

    pub fn unschedule(&self, workflow_id: &str) -> Option<ScheduledWorkflow> {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(workflow_id);
        if removed.is_some() {
            info!("Unscheduled workflow '{}'", workflow_id);
        }
        removed
    }

    pub fn get(&self, workflow_id: &str) -> Option<ScheduledWorkflow> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .cloned()
    }

    /// Snapshot of all entries, ordered by workflow id
    pub fn scheduled(&self) -> Vec<ScheduledWorkflow> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LoopState::Running { .. }
        )
    }

    fn is_stopped(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LoopState::Stopped
        )
    }

    /// Evaluate all entries once and run the due workflows.
    ///
    /// Due entries are advanced (`run_count`, `last_run`, `next_run`) before
    /// their executions start, so a slow run is not triggered twice. Failed
    /// runs are logged and counted; they never abort the tick.
    pub async fn tick(&self) -> TickSummary {
        let _permit = self.tick_gate.read().await;
        if self.is_stopped() {
            debug!("Scheduler stopped, skipping tick");
            return TickSummary::default();
        }

        let now = self.clock().now();
        let due: Vec<String> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .values_mut()
                .filter(|entry| now >= entry.next_run)
                .map(|entry| {
                    entry.run_count += 1;
                    entry.last_run = Some(now);
                    entry.next_run = calculate_next_run(&entry.schedule, now);
                    entry.workflow_id.clone()
                })
                .collect()
        };

        if due.is_empty() {
            return TickSummary::default();
        }

        info!("Scheduler tick: {} workflow(s) due", due.len());

        let runs = due.iter().map(|workflow_id| async move {
            let result = self
                .engine
                .execute_workflow(workflow_id, ExecuteOptions::scheduled())
                .await;
            (workflow_id, result)
        });

        let mut summary = TickSummary {
            triggered: due.len(),
            ..TickSummary::default()
        };

        for (workflow_id, result) in join_all(runs).await {
            match result {
                Ok(execution) => {
                    summary.succeeded += 1;
                    debug!(
                        "Scheduled run of '{}' completed (execution {})",
                        workflow_id, execution.id
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Scheduled run of '{}' failed: {}", workflow_id, e);
                }
            }
        }

        summary
    }

    /// Spawn the background tick loop. Starting a running scheduler is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, LoopState::Running { .. }) {
            warn!("Scheduler already running");
            return Ok(());
        }

        if self.tick_interval.is_zero() {
            return Err(StepflowError::SchedulerConfiguration(
                "tick interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; runs begin one period after start
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let summary = scheduler.tick().await;
                        if summary.triggered > 0 {
                            info!(
                                "Tick finished: {} triggered, {} succeeded, {} failed",
                                summary.triggered, summary.succeeded, summary.failed
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Scheduler loop exited");
        });

        *state = LoopState::Running {
            shutdown_tx,
            handle,
        };
        info!("Scheduler started (tick every {:?})", period);

        Ok(())
    }

    /// Stop the tick loop and wait for in-flight ticks to finish.
    ///
    /// Covers ticks driven by the loop and direct `tick()` calls from other
    /// tasks. Safe to call repeatedly or on a scheduler that never started.
    /// Once this returns no further scheduled runs are triggered until
    /// `start` is called again.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LoopState::Stopped,
        );

        match previous {
            LoopState::Running {
                shutdown_tx,
                handle,
            } => {
                info!("Shutting down scheduler");
                let _ = shutdown_tx.send(true);
                if let Err(e) = handle.await {
                    error!("Scheduler loop terminated abnormally: {}", e);
                }
                info!("Scheduler shutdown complete");
            }
            LoopState::Idle | LoopState::Stopped => {
                debug!("Scheduler shutdown requested while not running");
            }
        }

        drop(self.tick_gate.write().await);
    }
}
