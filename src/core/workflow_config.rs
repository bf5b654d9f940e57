//! Workflow descriptor configuration from YAML

use crate::core::{
    condition::TriggerPredicate,
    issue::IssueState,
    step::Step,
    workflow::Workflow,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// The workflow descriptor shipped with the repository
pub const DEFAULT_WORKFLOW_YAML: &str = include_str!("../../config/workflow.yml");

/// Top-level workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Which events the workflow listens to
    #[serde(default)]
    pub on: EventFilter,

    /// Token permissions the workflow needs (`issues: write`)
    #[serde(default)]
    pub permissions: BTreeMap<String, Permission>,

    /// Issue-level trigger condition
    pub trigger: TriggerConfig,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Event name and activity types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default = "default_event")]
    pub event: String,

    #[serde(default = "default_types")]
    pub types: Vec<String>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event: default_event(),
            types: default_types(),
        }
    }
}

fn default_event() -> String {
    "issues".to_string()
}

fn default_types() -> Vec<String> {
    vec!["labeled".to_string()]
}

/// Token permission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    None,
    Read,
    Write,
}

/// Issue-level trigger condition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Label the issue must carry
    pub label: String,

    /// State the issue must be in
    #[serde(default = "default_state")]
    pub state: IssueState,
}

fn default_state() -> IssueState {
    IssueState::Open
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier, referenced by guards
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// `<action>@<version>`
    pub uses: String,

    /// Action parameters
    #[serde(default)]
    pub with: BTreeMap<String, serde_yaml::Value>,

    /// Guard expression
    #[serde(default, rename = "if")]
    pub guard: Option<String>,
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The default descriptor
    pub fn default_workflow() -> Result<Self> {
        Self::from_yaml(DEFAULT_WORKFLOW_YAML)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            anyhow::bail!("Workflow '{}' declares no steps", self.name);
        }
        if self.on.types.is_empty() {
            anyhow::bail!("Workflow '{}' listens to no activity types", self.name);
        }
        if self.trigger.label.trim().is_empty() {
            anyhow::bail!("Workflow '{}' has an empty trigger label", self.name);
        }

        // Step IDs are unique and guards only look backwards
        let mut seen_ids = HashSet::new();
        let mut mutates = false;
        for config in &self.steps {
            let step = Step::from_config(config, &self.trigger.label)?;

            if let Some(guard) = &step.guard {
                let target = guard.referenced_step();
                if !seen_ids.contains(target) {
                    anyhow::bail!(
                        "Step '{}' guard references '{}', which is not an earlier step",
                        step.id,
                        target
                    );
                }
            }

            if !seen_ids.insert(step.id.clone()) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
            mutates |= step.action.mutates_issues();
        }

        if mutates {
            if let Some(level) = self.permissions.get("issues") {
                if *level != Permission::Write {
                    anyhow::bail!(
                        "Workflow '{}' modifies issues but grants issues: {:?}",
                        self.name,
                        level
                    );
                }
            }
        }

        Ok(())
    }

    /// The trigger predicate
    pub fn trigger_predicate(&self) -> TriggerPredicate {
        TriggerPredicate {
            event: self.on.event.clone(),
            actions: self.on.types.clone(),
            label: self.trigger.label.clone(),
            state: self.trigger.state,
        }
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}
