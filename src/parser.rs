//! YAML parser with validation for workflow documents
//!
//! A workflow document lists workflow definitions and, optionally, the
//! schedules that should be installed for them:
//!
//! ```yaml
//! workflows:
//!   - id: nightly-report
//!     name: Nightly report
//!     steps:
//!       - target: system
//!         action: echo
//!         params:
//!           message: hello
//! schedules:
//!   - workflow_id: nightly-report
//!     schedule:
//!       type: daily
//! ```

use crate::error::{Result, StepflowError};
use crate::models::{
    Schedule, WorkflowDefinition, MAX_WORKFLOW_COUNT, MAX_WORKFLOW_ID_LEN, MAX_YAML_SIZE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Schedule entry inside a workflow document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub workflow_id: String,
    pub schedule: Schedule,
}

/// Parsed workflow document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

/// Parse a workflow document from a YAML file.
///
/// Enforces the document limits:
/// - YAML file size must be <= 1MB
/// - Workflow count must be <= 1,000
/// - Workflow ids must be alphanumeric + underscore/dash only, at most 64 chars
/// - Schedules may only reference workflows defined in the same document
///
/// # Errors
///
/// * `StepflowError::Io` - If file cannot be read
/// * `StepflowError::YamlSizeExceeded` - If file exceeds 1MB
/// * `StepflowError::YamlParse` - If YAML is malformed
/// * `StepflowError::Validation` - If a workflow or schedule entry is invalid
/// * `StepflowError::SchedulerConfiguration` - If a schedule is invalid
///
/// # Example
///
/// ```no_run
/// use stepflow::parser::parse_workflow_file;
///
/// let document = parse_workflow_file("workflows.yaml")?;
/// println!("Loaded {} workflows", document.workflows.len());
/// # Ok::<(), stepflow::error::StepflowError>(())
/// ```
pub fn parse_workflow_file<P: AsRef<Path>>(path: P) -> Result<WorkflowDocument> {
    let content = fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Parse a workflow document from a YAML string.
///
/// # Example
///
/// ```
/// use stepflow::parser::parse_workflow_yaml;
///
/// let yaml = r#"
/// workflows:
///   - id: greet
///     steps:
///       - target: system
///         action: echo
/// "#;
///
/// let document = parse_workflow_yaml(yaml)?;
/// assert_eq!(document.workflows[0].id, "greet");
/// # Ok::<(), stepflow::error::StepflowError>(())
/// ```
pub fn parse_workflow_yaml(content: &str) -> Result<WorkflowDocument> {
    if content.len() > MAX_YAML_SIZE {
        return Err(StepflowError::YamlSizeExceeded(content.len()));
    }

    let mut document: WorkflowDocument = serde_yaml::from_str(content)?;

    if document.workflows.len() > MAX_WORKFLOW_COUNT {
        return Err(StepflowError::Validation(format!(
            "Document defines {} workflows, limit is {}",
            document.workflows.len(),
            MAX_WORKFLOW_COUNT
        )));
    }

    let mut seen_ids = HashSet::with_capacity(document.workflows.len());
    for workflow in &mut document.workflows {
        validate_workflow_id(&workflow.id)?;
        if !seen_ids.insert(workflow.id.clone()) {
            return Err(StepflowError::Validation(format!(
                "Duplicate workflow id '{}'",
                workflow.id
            )));
        }
        if workflow.name.is_empty() {
            workflow.name = workflow.id.clone();
        }
        workflow.validate_shape()?;
    }

    for entry in &document.schedules {
        if !seen_ids.contains(&entry.workflow_id) {
            return Err(StepflowError::Validation(format!(
                "Schedule references unknown workflow '{}'",
                entry.workflow_id
            )));
        }
        entry.schedule.validate()?;
    }

    Ok(document)
}

/// Validate workflow id format and length
fn validate_workflow_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StepflowError::Validation(
            "Workflow id cannot be empty".to_string(),
        ));
    }

    if id.len() > MAX_WORKFLOW_ID_LEN {
        return Err(StepflowError::Validation(format!(
            "Workflow id '{}' exceeds {} characters",
            id, MAX_WORKFLOW_ID_LEN
        )));
    }

    if !id.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(StepflowError::Validation(format!(
            "Workflow id '{}' may only contain alphanumerics, '_' and '-'",
            id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleType;

    #[test]
    fn test_parse_document() {
        let yaml = r#"
workflows:
  - id: backup
    name: Nightly backup
    description: "Copies things"
    steps:
      - target: shell
        action: run
        params:
          command: /bin/echo
          args: ["hi"]
      - target: system
        action: echo
schedules:
  - workflow_id: backup
    schedule:
      type: custom
      interval_ms: 5000
"#;
        let document = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(document.workflows.len(), 1);
        let workflow = &document.workflows[0];
        assert_eq!(workflow.name, "Nightly backup");
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[0].params["command"], "/bin/echo");
        assert!(workflow.steps[1].params.is_empty());

        assert_eq!(document.schedules.len(), 1);
        assert_eq!(
            document.schedules[0].schedule.schedule_type,
            ScheduleType::Custom
        );
        assert_eq!(document.schedules[0].schedule.interval_ms, Some(5000));
    }

    #[test]
    fn test_name_defaults_to_id() {
        let yaml = "workflows:\n  - id: w1\n    steps: []\n";
        let document = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(document.workflows[0].name, "w1");
        assert!(document.schedules.is_empty());
    }

    #[test]
    fn test_yaml_size_limit() {
        let large_yaml = "workflows:\n".to_string() + &"  - id: x\n".repeat(200_000);
        let result = parse_workflow_yaml(&large_yaml);
        assert!(matches!(result, Err(StepflowError::YamlSizeExceeded(_))));
    }

    #[test]
    fn test_workflow_count_limit() {
        let mut yaml = "workflows:\n".to_string();
        for i in 0..=MAX_WORKFLOW_COUNT {
            yaml.push_str(&format!("  - id: w{}\n", i));
        }
        let result = parse_workflow_yaml(&yaml);
        assert!(matches!(result, Err(StepflowError::Validation(msg)) if msg.contains("limit")));
    }

    #[test]
    fn test_workflow_id_validation() {
        assert!(validate_workflow_id("w1").is_ok());
        assert!(validate_workflow_id("nightly_backup-2").is_ok());

        assert!(validate_workflow_id("").is_err());
        assert!(validate_workflow_id("has space").is_err());
        assert!(validate_workflow_id("at@sign").is_err());
        assert!(validate_workflow_id(&"a".repeat(MAX_WORKFLOW_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = "workflows:\n  - id: w1\n  - id: w1\n";
        let result = parse_workflow_yaml(yaml);
        assert!(
            matches!(result, Err(StepflowError::Validation(msg)) if msg.contains("Duplicate workflow id"))
        );
    }

    #[test]
    fn test_blank_step_rejected() {
        let yaml = r#"
workflows:
  - id: w1
    steps:
      - target: ""
        action: echo
"#;
        assert!(matches!(
            parse_workflow_yaml(yaml),
            Err(StepflowError::Validation(_))
        ));
    }

    #[test]
    fn test_schedule_for_unknown_workflow() {
        let yaml = r#"
workflows:
  - id: w1
schedules:
  - workflow_id: w2
    schedule:
      type: hourly
"#;
        assert!(
            matches!(parse_workflow_yaml(yaml), Err(StepflowError::Validation(msg)) if msg.contains("w2"))
        );
    }

    #[test]
    fn test_invalid_schedule() {
        let yaml = r#"
workflows:
  - id: w1
schedules:
  - workflow_id: w1
    schedule:
      type: custom
      interval_ms: 0
"#;
        assert!(matches!(
            parse_workflow_yaml(yaml),
            Err(StepflowError::SchedulerConfiguration(_))
        ));
    }

    #[test]
    fn test_unknown_schedule_type() {
        let yaml = r#"
workflows:
  - id: w1
schedules:
  - workflow_id: w1
    schedule:
      type: monthly
"#;
        assert!(matches!(
            parse_workflow_yaml(yaml),
            Err(StepflowError::YamlParse(_))
        ));
    }
}
