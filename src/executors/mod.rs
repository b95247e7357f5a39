//! Step dispatch
//!
//! [`StepExecutor`] is the seam the engine calls once per step.
//! [`CapabilityRegistry`] is the standard implementation: it maps a
//! `(target, action)` pair to a [`Capability`] handler and reports
//! [`StepflowError::UnknownCapability`] on a miss.

pub mod echo;
pub mod http;
pub mod shell;

use crate::error::{Result, StepflowError};
use crate::models::{Step, StepParams, MAX_OUTPUT_SIZE};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Dispatches a step to whatever implements its target/action
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run a step and return its opaque result payload
    async fn execute(&self, step: &Step) -> Result<Value>;
}

/// Handler for a single target/action pair
#[async_trait]
pub trait Capability: Send + Sync {
    async fn execute(&self, params: &StepParams) -> anyhow::Result<Value>;
}

/// Adapter turning a plain closure into a [`Capability`]
pub struct FnCapability<F>(pub F);

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(&StepParams) -> anyhow::Result<Value> + Send + Sync,
{
    async fn execute(&self, params: &StepParams) -> anyhow::Result<Value> {
        (self.0)(params)
    }
}

/// Lookup table from `(target, action)` to capability handlers
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    handlers: HashMap<(String, String), Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `system.echo`, `shell.run` and `http.request`
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register("system", "echo", echo::EchoCapability);
        registry.register("shell", "run", shell::ShellCapability::new());
        registry.register("http", "request", http::HttpCapability::new()?);
        Ok(registry)
    }

    /// Install a handler, replacing any previous one for the same pair
    pub fn register<C>(
        &mut self,
        target: impl Into<String>,
        action: impl Into<String>,
        capability: C,
    ) -> &mut Self
    where
        C: Capability + 'static,
    {
        self.handlers
            .insert((target.into(), action.into()), Arc::new(capability));
        self
    }

    /// Install a synchronous closure as a handler
    pub fn register_fn<F>(
        &mut self,
        target: impl Into<String>,
        action: impl Into<String>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&StepParams) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(target, action, FnCapability(handler))
    }

    pub fn contains(&self, target: &str, action: &str) -> bool {
        self.handlers
            .contains_key(&(target.to_string(), action.to_string()))
    }

    /// Registered pairs, sorted for stable output
    pub fn capabilities(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self.handlers.keys().cloned().collect();
        pairs.sort();
        pairs
    }
}

#[async_trait]
impl StepExecutor for CapabilityRegistry {
    async fn execute(&self, step: &Step) -> Result<Value> {
        let capability = self
            .handlers
            .get(&(step.target.clone(), step.action.clone()))
            .cloned()
            .ok_or_else(|| StepflowError::UnknownCapability {
                target: step.target.clone(),
                action: step.action.clone(),
            })?;

        debug!("Dispatching step {}.{}", step.target, step.action);

        capability
            .execute(&step.params)
            .await
            .map_err(|e| StepflowError::StepExecutionFailure {
                target: step.target.clone(),
                action: step.action.clone(),
                message: format!("{:#}", e),
            })
    }
}

/// Decode typed parameters from a step's parameter map
pub(crate) fn decode_params<T: serde::de::DeserializeOwned>(params: &StepParams) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| anyhow::anyhow!("Invalid step parameters: {}", e))
}

/// Truncate byte output to MAX_OUTPUT_SIZE
///
/// Returns (truncated_string, was_truncated)
pub(crate) fn truncate_output_bytes(data: &[u8]) -> (String, bool) {
    let truncated = data.len() > MAX_OUTPUT_SIZE;
    let bytes = if truncated {
        &data[..MAX_OUTPUT_SIZE]
    } else {
        data
    };

    let output = String::from_utf8_lossy(bytes).to_string();
    (output, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_registered_capability() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("fs", "read", |params| {
            Ok(json!({ "path": params.get("path").cloned().unwrap_or(Value::Null) }))
        });

        let step = Step::new("fs", "read").with_param("path", "/tmp/x");
        let result = registry.execute(&step).await.unwrap();
        assert_eq!(result, json!({ "path": "/tmp/x" }));
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let registry = CapabilityRegistry::new();
        let result = registry.execute(&Step::new("browser", "click")).await;
        assert!(matches!(
            result,
            Err(StepflowError::UnknownCapability { target, action })
                if target == "browser" && action == "click"
        ));
    }

    #[tokio::test]
    async fn test_capability_failure_is_mapped() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("fs", "read", |_| Err(anyhow::anyhow!("permission denied")));

        let result = registry.execute(&Step::new("fs", "read")).await;
        match result {
            Err(StepflowError::StepExecutionFailure { message, .. }) => {
                assert!(message.contains("permission denied"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = CapabilityRegistry::with_builtins().unwrap();
        assert!(registry.contains("system", "echo"));
        assert!(registry.contains("shell", "run"));
        assert!(registry.contains("http", "request"));
        assert_eq!(registry.capabilities().len(), 3);
    }

    #[test]
    fn test_truncate_output() {
        let (output, truncated) = truncate_output_bytes(b"hello");
        assert_eq!(output, "hello");
        assert!(!truncated);

        let large_data = vec![b'x'; MAX_OUTPUT_SIZE + 1000];
        let (output, truncated) = truncate_output_bytes(&large_data);
        assert_eq!(output.len(), MAX_OUTPUT_SIZE);
        assert!(truncated);
    }
}
