//! Workflow domain model

use crate::core::{
    condition::TriggerPredicate,
    context::RunContext,
    issue::IssueEvent,
    state::{ExecutionStatus, RunState, StepState},
    step::Step,
    workflow_config::WorkflowConfig,
};
use anyhow::Result;

/// A workflow instantiated for one run
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Condition under which the workflow runs
    pub trigger: TriggerPredicate,

    /// Steps in declared order
    pub steps: Vec<Step>,

    /// Run state
    pub state: RunState,

    /// Event that started the run, once triggered
    pub event: Option<IssueEvent>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .map(|step_config| Step::from_config(step_config, &config.trigger.label))
            .collect::<Result<Vec<_>>>()?;

        Ok(Workflow {
            name: config.name.clone(),
            trigger: config.trigger_predicate(),
            steps,
            state: RunState::new(),
            event: None,
        })
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Step IDs in execution order
    pub fn execution_order(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if the run has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Build the context a step sees: the triggering event plus the outputs
    /// of every step completed so far
    pub fn create_context_for_step(&self, step_id: &str) -> RunContext {
        let mut context = match &self.event {
            Some(event) => RunContext::for_event(event),
            None => RunContext::new(),
        };
        context.set_variable("run_id", self.state.run_id.to_string());

        for step in &self.steps {
            if let StepState::Completed { outputs, .. } = &step.state {
                context.set_step_outputs(&step.id, outputs.clone());
            }
        }

        context.current_step_id = Some(step_id.to_string());
        context
    }

    /// Recount step states into the run state
    pub fn update_state_counts(&mut self) {
        let states: Vec<StepState> = self.steps.iter().map(|s| s.state.clone()).collect();
        self.state.update_counts(states.iter());
    }
}
