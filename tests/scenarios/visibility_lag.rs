//! Test: the pause lets the close become visible before locking

use crate::helpers::*;
use logship::core::ExecutionStatus;
use logship::tracker::TrackerCall;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_pause_longer_than_lag_locks() {
    let tracker = tracker([flagged_issue(20)], Some(Duration::from_secs(3)));
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(20)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert_completed(&workflow, "lock");
    assert!(tracker.issue(20).unwrap().locked);
}

#[tokio::test(start_paused = true)]
async fn test_pause_shorter_than_lag_fails_lock() {
    let tracker = tracker([flagged_issue(21)], Some(Duration::from_secs(8)));
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(21)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert_completed(&workflow, "pause");
    assert!(assert_failed(&workflow, "lock").contains("still reported open"));

    // The issue was closed but never locked, and the label stayed put
    let issue = tracker.issue(21).unwrap();
    assert!(!issue.is_open());
    assert!(!issue.locked);
    assert!(issue.has_label(TRIGGER_LABEL));
    assert!(!tracker
        .calls()
        .iter()
        .any(|c| matches!(c, TrackerCall::LockIssue(..))));
}

#[tokio::test(start_paused = true)]
async fn test_longer_configured_pause_covers_lag() {
    let tracker = tracker([flagged_issue(22)], Some(Duration::from_secs(8)));
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&workflow_with_pause(9.5), labeled_event(flagged_issue(22)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert!(tracker.issue(22).unwrap().locked);
}

#[tokio::test(start_paused = true)]
async fn test_zero_pause_races_lag() {
    let tracker = tracker([flagged_issue(23)], Some(Duration::from_millis(500)));
    let (engine, _) = engine(&tracker);

    let workflow = engine
        .handle_event(&workflow_with_pause(0.0), labeled_event(flagged_issue(23)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert_failed(&workflow, "lock");
}
