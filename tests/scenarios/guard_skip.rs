//! Test: pause and lock are skipped when close closed nothing

use crate::helpers::*;
use logship::core::{ExecutionStatus, IssueState};
use logship::execution::ExecutionEvent;
use logship::tracker::TrackerCall;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_already_closed_issue_skips_pause_and_lock() {
    // The webhook payload is older than the tracker's view of the issue
    let mut current = flagged_issue(8);
    current.state = IssueState::Closed;
    let tracker = tracker([current], None);
    let (engine, events) = engine(&tracker);

    let started = tokio::time::Instant::now();
    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(8)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert_eq!(output(&workflow, "close", "closed").as_deref(), Some("false"));
    assert_eq!(output(&workflow, "close", "closed-issues").as_deref(), Some("[]"));
    assert!(assert_skipped(&workflow, "pause").contains("guard"));
    assert!(assert_skipped(&workflow, "lock").contains("guard"));
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(tracker.calls(), vec![TrackerCall::GetIssue(8)]);
    assert!(!tracker.issue(8).unwrap().locked);

    let skipped: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepSkipped { step_id, .. } => Some(step_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["pause", "lock"]);
}

#[tokio::test]
async fn test_locked_issue_is_left_alone() {
    let mut current = flagged_issue(9);
    current.locked = true;
    let tracker = tracker([current], None);
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(9)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(output(&workflow, "close", "closed").as_deref(), Some("false"));
    assert_skipped(&workflow, "pause");
    assert_skipped(&workflow, "lock");
    assert_eq!(tracker.issue(9).unwrap().state, IssueState::Open);
}

#[tokio::test]
async fn test_negated_guard_runs_when_nothing_closed() {
    let yaml = r#"
name: "report"
trigger:
  label: "bot:close"
steps:
  - id: close
    uses: close-and-label@v1
  - id: note
    uses: pause@v1
    if: ${{ steps.close.outputs.closed != 'true' }}
    with:
      seconds: 0
"#;
    let config = logship::core::workflow_config::WorkflowConfig::from_yaml(yaml).unwrap();
    let mut current = flagged_issue(10);
    current.state = IssueState::Closed;
    let tracker = tracker([current], None);
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&config, labeled_event(flagged_issue(10)))
        .await
        .unwrap()
        .unwrap();

    assert_completed(&workflow, "note");
}
