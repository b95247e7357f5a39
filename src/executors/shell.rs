//! Shell command capability (`shell.run`)
//!
//! Runs a binary directly with an argument list; nothing passes through a
//! shell interpreter. A non-zero exit status fails the step.

use crate::error::{Result, StepflowError};
use crate::executors::{decode_params, truncate_output_bytes, Capability};
use crate::models::{StepParams, MAX_ARG_COUNT, MAX_ARG_LEN, MAX_COMMAND_LEN, MAX_OUTPUT_SIZE};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

fn default_timeout() -> u64 {
    300
}

/// Parameters accepted by `shell.run`
#[derive(Debug, Clone, Deserialize)]
pub struct ShellParams {
    pub command: String, // Absolute path to binary
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Output of a finished command
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output_truncated: bool,
}

impl ShellOutput {
    fn to_value(&self) -> Value {
        json!({
            "exit_code": self.exit_code,
            "stdout": self.stdout,
            "stderr": self.stderr,
            "output_truncated": self.output_truncated,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCapability;

impl ShellCapability {
    pub fn new() -> Self {
        Self
    }

    /// Run the command, enforcing the timeout
    pub async fn run(&self, params: &ShellParams) -> Result<ShellOutput> {
        validate_shell_params(params)?;

        info!("Executing shell command: {}", params.command);
        debug!("Command args: {:?}", params.args);

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args);

        if let Some(workdir) = &params.workdir {
            cmd.current_dir(workdir);
        }

        if let Some(env) = &params.env {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        // Timed-out children are killed when the output future is dropped
        cmd.kill_on_drop(true);

        let output_result =
            tokio::time::timeout(Duration::from_secs(params.timeout_secs), cmd.output()).await;

        match output_result {
            Ok(Ok(output)) => {
                let (stdout, stdout_truncated) = truncate_output_bytes(&output.stdout);
                let (stderr, stderr_truncated) = truncate_output_bytes(&output.stderr);
                let output_truncated = stdout_truncated || stderr_truncated;

                if output_truncated {
                    debug!("Output truncated to {} bytes", MAX_OUTPUT_SIZE);
                }

                info!(
                    "Command completed (exit code: {:?})",
                    output.status.code()
                );

                Ok(ShellOutput {
                    exit_code: output.status.code(),
                    stdout,
                    stderr,
                    output_truncated,
                })
            }
            Ok(Err(e)) => {
                error!("Command execution failed: {}", e);
                Err(StepflowError::Io(e))
            }
            Err(_) => {
                error!("Command timed out after {} seconds", params.timeout_secs);
                Err(StepflowError::Other(format!(
                    "Command '{}' timed out after {} seconds",
                    params.command, params.timeout_secs
                )))
            }
        }
    }
}

#[async_trait]
impl Capability for ShellCapability {
    async fn execute(&self, params: &StepParams) -> anyhow::Result<Value> {
        let params: ShellParams = decode_params(params)?;
        let output = self.run(&params).await?;

        if output.exit_code == Some(0) {
            Ok(output.to_value())
        } else {
            Err(anyhow::anyhow!(
                "Command '{}' exited with {:?}: {}",
                params.command,
                output.exit_code,
                output.stderr.trim()
            ))
        }
    }
}

/// Validate shell parameters: absolute command path, bounded arguments,
/// and a traversal-free working directory
pub fn validate_shell_params(params: &ShellParams) -> Result<()> {
    if params.command.len() > MAX_COMMAND_LEN {
        return Err(StepflowError::Validation(format!(
            "Command exceeds {} bytes",
            MAX_COMMAND_LEN
        )));
    }

    if !params.command.starts_with('/') {
        return Err(StepflowError::InvalidPath(
            "Command must be an absolute path".to_string(),
        ));
    }

    if params.args.len() > MAX_ARG_COUNT {
        return Err(StepflowError::Validation(format!(
            "Argument count {} exceeds limit of {}",
            params.args.len(),
            MAX_ARG_COUNT
        )));
    }

    if params.args.iter().any(|arg| arg.len() > MAX_ARG_LEN) {
        return Err(StepflowError::Validation(format!(
            "Argument exceeds {} bytes",
            MAX_ARG_LEN
        )));
    }

    if let Some(workdir) = &params.workdir {
        if !workdir.starts_with('/') {
            return Err(StepflowError::InvalidPath(format!(
                "Working directory must be absolute: {}",
                workdir
            )));
        }
        if workdir.split('/').any(|component| component == "..") {
            return Err(StepflowError::PathTraversal(workdir.clone()));
        }
    }

    if params.timeout_secs == 0 {
        return Err(StepflowError::Validation(
            "timeout_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> StepParams {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[tokio::test]
    async fn test_shell_success() {
        let capability = ShellCapability::new();
        let result = capability
            .execute(&params(json!({ "command": "/bin/echo", "args": ["hello"] })))
            .await
            .unwrap();

        assert_eq!(result["exit_code"], json!(0));
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_fails() {
        let capability = ShellCapability::new();
        let result = capability
            .execute(&params(json!({ "command": "/bin/sh", "args": ["-c", "exit 3"] })))
            .await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("Some(3)"));
    }

    #[tokio::test]
    async fn test_shell_with_env() {
        let capability = ShellCapability::new();
        let result = capability
            .execute(&params(json!({
                "command": "/bin/sh",
                "args": ["-c", "echo $STEPFLOW_TEST_VAR"],
                "env": { "STEPFLOW_TEST_VAR": "test_value" }
            })))
            .await
            .unwrap();

        assert!(result["stdout"].as_str().unwrap().contains("test_value"));
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let capability = ShellCapability::new();
        let shell_params = ShellParams {
            command: "/bin/sleep".to_string(),
            args: vec!["10".to_string()],
            workdir: None,
            env: None,
            timeout_secs: 1,
        };

        let result = capability.run(&shell_params).await;
        assert!(matches!(result, Err(StepflowError::Other(_))));
    }

    #[tokio::test]
    async fn test_missing_command_param() {
        let capability = ShellCapability::new();
        let result = capability.execute(&params(json!({ "args": ["x"] }))).await;
        assert!(result.unwrap_err().to_string().contains("Invalid step parameters"));
    }

    #[tokio::test]
    async fn test_invalid_command() {
        let capability = ShellCapability::new();
        let result = capability
            .execute(&params(json!({ "command": "/nonexistent/command" })))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_shell_params() {
        let mut shell_params = ShellParams {
            command: "/bin/echo".to_string(),
            args: vec!["hello".to_string()],
            workdir: Some("/tmp".to_string()),
            env: None,
            timeout_secs: 5,
        };
        assert!(validate_shell_params(&shell_params).is_ok());

        shell_params.command = "echo".to_string();
        assert!(matches!(
            validate_shell_params(&shell_params),
            Err(StepflowError::InvalidPath(_))
        ));

        shell_params.command = "/bin/echo".to_string();
        shell_params.workdir = Some("/tmp/../etc".to_string());
        assert!(matches!(
            validate_shell_params(&shell_params),
            Err(StepflowError::PathTraversal(_))
        ));

        shell_params.workdir = None;
        shell_params.args = vec!["a".to_string(); MAX_ARG_COUNT + 1];
        assert!(validate_shell_params(&shell_params).is_err());
    }
}
