//! Bounded audit log of finished executions

use crate::engine::{ExecutionEvent, ExecutionObserver};
use crate::models::Execution;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// FIFO-trimmed execution history, oldest first
#[derive(Debug)]
pub struct AuditHistory {
    max_entries: usize,
    entries: Mutex<VecDeque<Execution>>,
}

impl AuditHistory {
    /// A limit of zero is treated as one
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            entries: Mutex::new(VecDeque::with_capacity(max_entries)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn append(&self, execution: Execution) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(execution);
        while entries.len() > self.max_entries {
            if let Some(dropped) = entries.pop_front() {
                debug!("History full, dropping execution {}", dropped.id);
            }
        }
    }

    /// The last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<Execution> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<Execution> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn get(&self, execution_id: &str) -> Option<Execution> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|execution| execution.id == execution_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ExecutionObserver for AuditHistory {
    fn on_event(&self, event: &ExecutionEvent) {
        if let Some(execution) = event.finished_execution() {
            self.append(execution.clone());
        }
    }

    fn name(&self) -> &'static str {
        "AuditHistory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecuteOptions;
    use chrono::Utc;

    fn execution(workflow_id: &str) -> Execution {
        let mut execution = Execution::start(workflow_id, ExecuteOptions::default(), Utc::now());
        execution.complete(Utc::now());
        execution
    }

    #[test]
    fn test_fifo_trim() {
        let history = AuditHistory::new(100);
        let appended: Vec<_> = (0..150).map(|i| execution(&format!("w{}", i))).collect();
        for entry in &appended {
            history.append(entry.clone());
        }

        let all = history.all();
        assert_eq!(all.len(), 100);
        assert_eq!(all, appended[50..].to_vec());
    }

    #[test]
    fn test_recent() {
        let history = AuditHistory::default();
        for i in 0..5 {
            history.append(execution(&format!("w{}", i)));
        }

        let recent: Vec<_> = history.recent(2).into_iter().map(|e| e.workflow_id).collect();
        assert_eq!(recent, vec!["w3", "w4"]);
        assert_eq!(history.recent(50).len(), 5);
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn test_get_by_id() {
        let history = AuditHistory::new(2);
        let first = execution("a");
        history.append(first.clone());
        assert_eq!(history.get(&first.id), Some(first.clone()));

        history.append(execution("b"));
        history.append(execution("c"));
        assert!(history.get(&first.id).is_none());
    }

    #[test]
    fn test_observer_records_only_finished() {
        let history = AuditHistory::default();
        let running = Execution::start("w1", ExecuteOptions::default(), Utc::now());
        history.on_event(&ExecutionEvent::Started(running));
        assert!(history.is_empty());

        history.on_event(&ExecutionEvent::Completed(execution("w1")));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let history = AuditHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.append(execution("a"));
        history.append(execution("b"));
        assert_eq!(history.all()[0].workflow_id, "b");
    }
}
