//! Test utility functions for logship

#![allow(dead_code)]

use logship::core::workflow_config::{WorkflowConfig, DEFAULT_WORKFLOW_YAML};
use logship::core::{Issue, IssueEvent, StepState, Workflow};
use logship::execution::{ExecutionEvent, WorkflowEngine};
use logship::tracker::InMemoryTracker;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TRIGGER_LABEL: &str = "bot:close";
pub const CLOSE_LABEL: &str = "insufficient information";
pub const REPO: &str = "acme/widgets";

/// The shipped workflow with a different pause
pub fn workflow_with_pause(seconds: f64) -> WorkflowConfig {
    let yaml = DEFAULT_WORKFLOW_YAML.replace("seconds: 5", &format!("seconds: {}", seconds));
    WorkflowConfig::from_yaml(&yaml).unwrap()
}

/// The shipped workflow
pub fn default_workflow() -> WorkflowConfig {
    WorkflowConfig::default_workflow().unwrap()
}

/// An open issue carrying the trigger label
pub fn flagged_issue(number: u64) -> Issue {
    Issue::open(number, &[TRIGGER_LABEL])
}

/// A `labeled` event for the trigger label
pub fn labeled_event(issue: Issue) -> IssueEvent {
    IssueEvent::labeled(issue, TRIGGER_LABEL).with_repository(REPO)
}

/// Tracker seeded with the given issues, optionally lagging reads
pub fn tracker(issues: impl IntoIterator<Item = Issue>, lag: Option<Duration>) -> Arc<InMemoryTracker> {
    let tracker = InMemoryTracker::with_issues(issues);
    Arc::new(match lag {
        Some(delay) => tracker.with_visibility_delay(delay),
        None => tracker,
    })
}

/// Engine over a shared tracker, recording every execution event
pub fn engine(
    tracker: &Arc<InMemoryTracker>,
) -> (WorkflowEngine<Arc<InMemoryTracker>>, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let engine = WorkflowEngine::new(tracker.clone());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));
    (engine, events)
}

/// State of a step after a run
pub fn step_state<'a>(workflow: &'a Workflow, id: &str) -> &'a StepState {
    &workflow
        .step(id)
        .unwrap_or_else(|| panic!("no step {}", id))
        .state
}

pub fn assert_completed(workflow: &Workflow, id: &str) {
    assert!(
        matches!(step_state(workflow, id), StepState::Completed { .. }),
        "step {} should be completed, got {:?}",
        id,
        step_state(workflow, id)
    );
}

/// Assert a step was skipped and return the reason
pub fn assert_skipped(workflow: &Workflow, id: &str) -> String {
    match step_state(workflow, id) {
        StepState::Skipped { reason } => reason.clone(),
        other => panic!("step {} should be skipped, got {:?}", id, other),
    }
}

/// Assert a step failed and return the error
pub fn assert_failed(workflow: &Workflow, id: &str) -> String {
    match step_state(workflow, id) {
        StepState::Failed { error, .. } => error.clone(),
        other => panic!("step {} should have failed, got {:?}", id, other),
    }
}

/// Output value of a completed step
pub fn output(workflow: &Workflow, step: &str, key: &str) -> Option<String> {
    match step_state(workflow, step) {
        StepState::Completed { outputs, .. } => outputs.get(key).cloned(),
        _ => None,
    }
}
