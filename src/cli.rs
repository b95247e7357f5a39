//! CLI interface for Stepflow

use crate::config::EngineConfig;
use crate::error::StepflowError;
use crate::executors::CapabilityRegistry;
use crate::logging::init_logging;
use crate::models::ExecuteOptions;
use crate::orchestrator::Orchestrator;
use crate::parser::parse_workflow_file;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Stepflow - in-process workflow orchestration engine
#[derive(Parser, Debug)]
#[command(name = "stepflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Workflow orchestration engine with scheduling and run analytics", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json or pretty); overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a workflow document
    Validate {
        /// Path to workflow YAML file
        workflow: PathBuf,
    },

    /// Execute one workflow from a document and print the execution record
    Run {
        /// Path to workflow YAML file
        workflow: PathBuf,

        /// Id of the workflow to execute
        workflow_id: String,
    },

    /// Load a document, install its schedules and run the scheduler until stopped
    Serve {
        /// Path to workflow YAML file; defaults to `workflows_file` from the config
        workflow: Option<PathBuf>,
    },
}

impl Cli {
    /// Load configuration, applying command line overrides
    pub fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::load(self.config.as_deref())?;
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Initialize logging from the effective configuration
    pub fn init_logging(&self, config: &EngineConfig) -> anyhow::Result<()> {
        init_logging(&config.log_config())
    }

    /// Execute the CLI command
    pub async fn execute(&self, config: &EngineConfig) -> anyhow::Result<()> {
        match &self.command {
            Commands::Validate { workflow } => self.validate_workflow(workflow),
            Commands::Run {
                workflow,
                workflow_id,
            } => self.run_workflow(config, workflow, workflow_id).await,
            Commands::Serve { workflow } => {
                let path = workflow
                    .clone()
                    .or_else(|| config.workflows_file.clone())
                    .ok_or_else(|| {
                        anyhow::anyhow!("No workflow file given and `workflows_file` is not configured")
                    })?;
                self.serve(config, &path).await
            }
        }
    }

    /// Validate a workflow document without executing anything
    fn validate_workflow(&self, workflow_path: &Path) -> anyhow::Result<()> {
        info!("Validating workflow document: {:?}", workflow_path);

        let document = parse_workflow_file(workflow_path)?;
        let capabilities = CapabilityRegistry::with_builtins()?;

        println!("Workflow document is valid");
        println!("Workflows: {}", document.workflows.len());
        for workflow in &document.workflows {
            println!("  - {} ({} steps)", workflow.id, workflow.steps.len());
            for step in &workflow.steps {
                if !capabilities.contains(&step.target, &step.action) {
                    println!(
                        "      warning: no built-in capability for {}.{}",
                        step.target, step.action
                    );
                }
            }
        }
        println!("Schedules: {}", document.schedules.len());

        Ok(())
    }

    /// Run a single workflow once
    async fn run_workflow(
        &self,
        config: &EngineConfig,
        workflow_path: &Path,
        workflow_id: &str,
    ) -> anyhow::Result<()> {
        info!("Loading workflows from: {:?}", workflow_path);

        let mut document = parse_workflow_file(workflow_path)?;
        // One-shot runs ignore the schedules in the document
        document.schedules.clear();

        let orchestrator = Orchestrator::new(Arc::new(CapabilityRegistry::with_builtins()?), config)?;
        orchestrator.load_document(document)?;

        match orchestrator
            .execute_workflow(workflow_id, ExecuteOptions::default())
            .await
        {
            Ok(execution) => {
                println!("{}", serde_json::to_string_pretty(&execution)?);
                info!("Workflow '{}' completed successfully", workflow_id);
                Ok(())
            }
            Err(StepflowError::ExecutionFailed(execution)) => {
                println!("{}", serde_json::to_string_pretty(&execution)?);
                error!("Workflow '{}' failed", workflow_id);
                std::process::exit(1);
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the scheduler until SIGTERM or SIGINT
    async fn serve(&self, config: &EngineConfig, workflow_path: &Path) -> anyhow::Result<()> {
        info!("Starting scheduler for workflows in {:?}", workflow_path);

        let document = parse_workflow_file(workflow_path)?;
        if document.schedules.is_empty() {
            info!("Document defines no schedules; nothing will run until one is added");
        }

        let orchestrator = Orchestrator::new(Arc::new(CapabilityRegistry::with_builtins()?), config)?;
        orchestrator.load_document(document)?;
        orchestrator.start()?;

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }

        orchestrator.shutdown().await;

        let analytics = orchestrator.get_analytics(0);
        info!(
            "Processed {} executions ({} failed)",
            analytics.metrics.total_workflows, analytics.metrics.failed_workflows
        );

        Ok(())
    }
}
