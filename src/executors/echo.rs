//! Echo capability: returns its parameters unchanged

use crate::executors::Capability;
use crate::models::StepParams;
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    async fn execute(&self, params: &StepParams) -> anyhow::Result<Value> {
        Ok(json!({ "echo": params }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_params() {
        let mut params = StepParams::new();
        params.insert("message".to_string(), json!("hi"));

        let result = EchoCapability.execute(&params).await.unwrap();
        assert_eq!(result, json!({ "echo": { "message": "hi" } }));
    }
}
