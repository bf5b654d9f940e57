//! Run context - the triggering issue plus outputs accumulated by prior steps

use crate::core::issue::IssueEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution context for a workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    /// Values available to message templates (`issue.number`, `repository`, ...)
    pub variables: HashMap<String, String>,

    /// Outputs from completed steps (step_id -> key -> value)
    pub step_outputs: HashMap<String, HashMap<String, String>>,

    /// The step being executed, if any
    pub current_step_id: Option<String>,
}

impl RunContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the context from the triggering event
    pub fn for_event(event: &IssueEvent) -> Self {
        let mut ctx = Self::new();
        ctx.set_variable("issue.number", event.issue.number.to_string());
        ctx.set_variable("issue.title", event.issue.title.clone());
        ctx.set_variable("issue.state", event.issue.state.to_string());
        ctx.set_variable("event.action", event.action.clone());
        if let Some(label) = &event.label {
            ctx.set_variable("event.label", label.name.clone());
        }
        if let Some(repo) = event.repository_name() {
            ctx.set_variable("repository", repo.to_string());
        }
        ctx
    }

    pub fn set_variable(&mut self, key: &str, value: String) {
        self.variables.insert(key.to_string(), value);
    }

    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Record one output of a step
    pub fn set_output(&mut self, step_id: &str, key: &str, value: String) {
        self.step_outputs
            .entry(step_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Record all outputs of a step
    pub fn set_step_outputs(&mut self, step_id: &str, outputs: HashMap<String, String>) {
        self.step_outputs
            .entry(step_id.to_string())
            .or_default()
            .extend(outputs);
    }

    /// Read one output of a prior step
    pub fn get_output(&self, step_id: &str, key: &str) -> Option<&String> {
        self.step_outputs.get(step_id).and_then(|o| o.get(key))
    }

    /// All values available for template rendering
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        for (step_id, outputs) in &self.step_outputs {
            for (key, value) in outputs {
                vars.insert(format!("steps.{}.outputs.{}", step_id, key), value.clone());
            }
        }

        if let Some(ref current_step) = self.current_step_id {
            vars.insert("current_step".to_string(), current_step.clone());
        }

        vars
    }

    /// Substitute `{{ name }}` placeholders
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (key, value) in self.get_rendering_variables() {
            let placeholder = format!("{{{{ {} }}}}", key);
            rendered = rendered.replace(&placeholder, &value);
        }
        rendered
    }
}
