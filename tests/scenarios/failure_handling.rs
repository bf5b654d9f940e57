//! Test: a failing step halts the run

use crate::helpers::*;
use logship::core::ExecutionStatus;
use logship::execution::{ExecutionEvent, HALTED_REASON};
use logship::tracker::{TrackerCall, TrackerOp};

#[tokio::test(start_paused = true)]
async fn test_close_failure_halts_remaining_steps() {
    let tracker = tracker([flagged_issue(11)], None);
    tracker.fail_on(TrackerOp::CloseIssue);
    let (engine, events) = engine(&tracker);

    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(11)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert!(workflow.has_failed());
    assert!(assert_failed(&workflow, "close").contains("500"));
    assert_eq!(assert_skipped(&workflow, "pause"), HALTED_REASON);
    assert_eq!(assert_skipped(&workflow, "lock"), HALTED_REASON);
    assert!(workflow.is_complete());

    assert!(!tracker
        .calls()
        .iter()
        .any(|c| matches!(c, TrackerCall::LockIssue(..) | TrackerCall::RemoveLabel(..))));

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepFailed { step_id, .. } if step_id == "close")));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunCompleted {
            status: ExecutionStatus::Failed,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_lock_failure_fails_run_after_close() {
    let tracker = tracker([flagged_issue(12)], None);
    tracker.fail_on(TrackerOp::LockIssue);
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(12)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert_completed(&workflow, "close");
    assert_completed(&workflow, "pause");
    assert_failed(&workflow, "lock");
    assert_eq!(workflow.state.completed_steps, 2);
    assert_eq!(workflow.state.failed_steps, 1);

    let issue = tracker.issue(12).unwrap();
    assert!(!issue.is_open());
    assert!(!issue.locked);
}

#[tokio::test]
async fn test_missing_issue_fails_first_step() {
    let tracker = tracker([], None);
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(13)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert!(assert_failed(&workflow, "close").contains("13"));
    assert_eq!(assert_skipped(&workflow, "lock"), HALTED_REASON);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_releases_trigger() {
    let tracker = tracker([flagged_issue(14)], None);
    tracker.fail_on(TrackerOp::GetIssue);
    let (engine, _) = engine(&tracker);
    let config = default_workflow();

    let first = engine
        .handle_event(&config, labeled_event(flagged_issue(14)))
        .await
        .unwrap()
        .unwrap();
    assert!(first.has_failed());

    // The next delivery starts a new run instead of being ignored
    let second = engine
        .handle_event(&config, labeled_event(flagged_issue(14)))
        .await
        .unwrap();
    assert!(second.is_some());
}
