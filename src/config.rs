//! Runtime configuration
//!
//! Values are layered: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `STEPFLOW_*` environment variables (for example
//! `STEPFLOW_TICK_INTERVAL_SECS=5`).

use crate::error::{Result, StepflowError};
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::logging::{LogConfig, LogFormat, LogLevel};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "STEPFLOW";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
    /// Maximum number of executions kept in the audit history
    pub history_limit: usize,
    pub log_level: String,
    /// `json` or `pretty`
    pub log_format: String,
    /// Workflow document loaded by `serve` when no file is given on the command line
    pub workflows_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            workflows_file: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        }

        let config: EngineConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(StepflowError::Validation(
                "tick_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(StepflowError::Validation(
                "history_limit must be at least 1".to_string(),
            ));
        }
        if !matches!(self.log_format.to_lowercase().as_str(), "json" | "pretty") {
            return Err(StepflowError::Validation(format!(
                "log_format must be 'json' or 'pretty', got '{}'",
                self.log_format
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: LogLevel::from(self.log_level.as_str()),
            format: LogFormat::from(self.log_format.as_str()),
        }
    }
}
