//! Workflow engine - turns a triggering event into a run of ordered steps

use crate::{
    core::{
        condition::Trigger,
        issue::IssueEvent,
        state::{ExecutionStatus, StepState},
        workflow::Workflow,
        workflow_config::WorkflowConfig,
    },
    execution::{ExecutionResult, StepExecutor},
    tracker::IssueTracker,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reason recorded on steps that never ran because an earlier one failed
pub const HALTED_REASON: &str = "halted after failure";

/// Events that can occur during a workflow run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        issue_number: u64,
    },
    StepStarted {
        step_id: String,
    },
    StepCompleted {
        step_id: String,
        outputs: HashMap<String, String>,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    RunCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

type TriggerKey = (String, u64);

/// Workflow execution engine
///
/// Keeps one trigger per (workflow, issue). A trigger stays active for the
/// duration of its run, so a second matching event for the same issue does
/// not start an overlapping run.
pub struct WorkflowEngine<T> {
    executor: Arc<StepExecutor<T>>,
    triggers: Mutex<HashMap<TriggerKey, Trigger>>,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl<T: IssueTracker> WorkflowEngine<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            executor: Arc::new(StepExecutor::new(tracker)),
            triggers: Mutex::new(HashMap::new()),
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn tracker(&self) -> &T {
        self.executor.tracker()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        lock(&self.event_handlers).push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        let handlers: Vec<EventHandler> = lock(&self.event_handlers).clone();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Feed an event to the workflow.
    ///
    /// Returns `None` when the trigger does not fire, otherwise the finished
    /// run.
    pub async fn handle_event(
        &self,
        config: &WorkflowConfig,
        event: IssueEvent,
    ) -> Result<Option<Workflow>> {
        let mut workflow = config.to_workflow()?;
        let key = (workflow.name.clone(), event.issue.number);

        {
            let mut triggers = lock(&self.triggers);
            let trigger = triggers
                .entry(key.clone())
                .or_insert_with(|| Trigger::new(workflow.trigger.clone()));
            if !trigger.fire(&event) {
                if trigger.state() == crate::core::TriggerState::Idle {
                    triggers.remove(&key);
                    debug!(
                        "Event {}/{} on issue #{} does not match trigger of '{}'",
                        event.event, event.action, event.issue.number, workflow.name
                    );
                } else {
                    info!(
                        "Workflow '{}' is already running for issue #{}, ignoring event",
                        workflow.name, event.issue.number
                    );
                }
                return Ok(None);
            }
        }

        // Resets the trigger however the run ends
        let _active = ActiveRun {
            triggers: &self.triggers,
            key,
        };

        workflow.event = Some(event);
        self.execute(&mut workflow).await?;
        Ok(Some(workflow))
    }

    /// Run every step of a triggered workflow in declared order
    pub async fn execute(&self, workflow: &mut Workflow) -> Result<ExecutionStatus> {
        let run_id = workflow.state.run_id;
        let issue_number = workflow
            .event
            .as_ref()
            .map(|e| e.issue.number)
            .context("Workflow has no triggering event")?;

        info!(
            "Starting workflow run: {} ({}) for issue #{}",
            workflow.name, run_id, issue_number
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            workflow_name: workflow.name.clone(),
            issue_number,
        });

        workflow.state.start(workflow.steps.len());

        for step_id in workflow.execution_order() {
            self.execute_step(workflow, &step_id, issue_number).await?;
            workflow.update_state_counts();
        }

        let status = if workflow.has_failed() {
            ExecutionStatus::Failed
        } else {
            workflow.state.complete();
            ExecutionStatus::Completed
        };

        info!("Workflow run finished: {} - {:?}", workflow.name, status);
        self.emit_event(ExecutionEvent::RunCompleted { run_id, status });

        Ok(status)
    }

    /// Execute a single step
    async fn execute_step(&self, workflow: &mut Workflow, step_id: &str, issue_number: u64) -> Result<()> {
        let step = workflow
            .step(step_id)
            .cloned()
            .with_context(|| format!("Step {} not found", step_id))?;

        if workflow.has_failed() {
            self.mark_step_skipped(workflow, step_id, HALTED_REASON.to_string());
            return Ok(());
        }

        let context = workflow.create_context_for_step(step_id);

        if let Some(guard) = &step.guard {
            if !guard.evaluate(&context) {
                info!("Skipping step {}: guard `{}` is false", step_id, guard);
                self.mark_step_skipped(workflow, step_id, format!("guard `{}` is false", guard));
                return Ok(());
            }
        }

        let started_at = chrono::Utc::now();
        if let Some(s) = workflow.step_mut(step_id) {
            s.state = StepState::Running { started_at };
        }
        self.emit_event(ExecutionEvent::StepStarted {
            step_id: step_id.to_string(),
        });

        match self.executor.execute(&step, issue_number, &context).await {
            ExecutionResult::Success { outputs } => {
                if let Some(s) = workflow.step_mut(step_id) {
                    s.state = StepState::Completed {
                        outputs: outputs.clone(),
                        started_at,
                        completed_at: chrono::Utc::now(),
                    };
                }
                self.emit_event(ExecutionEvent::StepCompleted {
                    step_id: step_id.to_string(),
                    outputs,
                });
            }
            ExecutionResult::Failed { error } => {
                warn!("Step {} failed, halting run: {}", step_id, error);
                if let Some(s) = workflow.step_mut(step_id) {
                    s.state = StepState::Failed {
                        error: error.clone(),
                        started_at,
                        failed_at: chrono::Utc::now(),
                    };
                }
                workflow.state.fail();
                self.emit_event(ExecutionEvent::StepFailed {
                    step_id: step_id.to_string(),
                    error,
                });
            }
        }

        Ok(())
    }

    fn mark_step_skipped(&self, workflow: &mut Workflow, step_id: &str, reason: String) {
        if let Some(s) = workflow.step_mut(step_id) {
            s.state = StepState::Skipped {
                reason: reason.clone(),
            };
        }
        self.emit_event(ExecutionEvent::StepSkipped {
            step_id: step_id.to_string(),
            reason,
        });
    }
}

struct ActiveRun<'a> {
    triggers: &'a Mutex<HashMap<TriggerKey, Trigger>>,
    key: TriggerKey,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Some(mut trigger) = lock(self.triggers).remove(&self.key) {
            trigger.reset();
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
