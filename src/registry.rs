//! In-memory workflow registry
//!
//! Definitions are stored behind `Arc` so an execution that already picked up a
//! definition keeps its own step list even if the id is re-registered or
//! removed while it runs. Listing preserves first-registration order.

use crate::error::{Result, StepflowError};
use crate::models::WorkflowDefinition;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryInner {
    order: Vec<String>,
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
}

/// Registry of named workflow definitions
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    inner: RwLock<RegistryInner>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a definition under `id`, replacing any previous one
    ///
    /// The stored definition's `id` field is set to `id`. Only structural
    /// shape is checked; whether a capability exists for each step is
    /// discovered at execution time.
    pub fn register(
        &self,
        id: impl Into<String>,
        mut definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StepflowError::Validation(
                "Workflow id cannot be empty".to_string(),
            ));
        }

        definition.id = id.clone();
        definition.validate_shape()?;
        let definition = Arc::new(definition);

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = inner
            .workflows
            .insert(id.clone(), Arc::clone(&definition))
            .is_some();
        if replaced {
            info!("Workflow '{}' re-registered", id);
        } else {
            inner.order.push(id.clone());
            info!(
                "Workflow '{}' registered with {} steps",
                id,
                definition.steps.len()
            );
        }

        Ok(definition)
    }

    /// Register a definition, generating an id when it carries none
    pub fn register_new(&self, definition: WorkflowDefinition) -> Result<String> {
        let id = if definition.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            definition.id.clone()
        };
        self.register(id.clone(), definition)?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Arc<WorkflowDefinition>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .workflows
            .get(id)
            .cloned()
            .ok_or_else(|| StepflowError::WorkflowNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .workflows
            .contains_key(id)
    }

    /// Snapshot of all definitions in registration order
    pub fn list(&self) -> Vec<WorkflowDefinition> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.workflows.get(id))
            .map(|definition| definition.as_ref().clone())
            .collect()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.workflows.remove(id);
        if removed.is_some() {
            inner.order.retain(|existing| existing != id);
            debug!("Workflow '{}' removed from registry", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .workflows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
