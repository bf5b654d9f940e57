//! Test: happy path - a flagged open issue is closed, labelled and locked

use crate::helpers::*;
use logship::core::step::CloseReason;
use logship::core::{ExecutionStatus, IssueState, LockReason};
use logship::execution::ExecutionEvent;
use logship::tracker::TrackerCall;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_flagged_issue_is_closed_then_locked() {
    let tracker = tracker([flagged_issue(42)], None);
    let (engine, events) = engine(&tracker);

    let started = tokio::time::Instant::now();
    let workflow = engine
        .handle_event(&default_workflow(), labeled_event(flagged_issue(42)))
        .await
        .unwrap()
        .expect("event should trigger the workflow");

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert!(started.elapsed() >= Duration::from_secs(5));

    for id in ["close", "pause", "lock"] {
        assert_completed(&workflow, id);
    }
    assert_eq!(output(&workflow, "close", "closed").as_deref(), Some("true"));
    assert_eq!(output(&workflow, "close", "closed-issues").as_deref(), Some("[42]"));
    assert_eq!(output(&workflow, "lock", "locked").as_deref(), Some("true"));

    let issue = tracker.issue(42).unwrap();
    assert_eq!(issue.state, IssueState::Closed);
    assert!(issue.locked);
    assert_eq!(issue.labels, vec![CLOSE_LABEL.to_string()]);

    let comments = tracker.comments(42);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("does not contain"));

    assert_eq!(
        tracker.calls(),
        vec![
            TrackerCall::GetIssue(42),
            TrackerCall::CreateComment(42, comments[0].clone()),
            TrackerCall::AddLabels(42, vec![CLOSE_LABEL.to_string()]),
            TrackerCall::CloseIssue(42, CloseReason::NotPlanned),
            TrackerCall::GetIssue(42),
            TrackerCall::RemoveLabel(42, TRIGGER_LABEL.to_string()),
            TrackerCall::LockIssue(42, Some(LockReason::Spam)),
        ]
    );

    let events = events.lock().unwrap();
    assert!(matches!(
        events.first(),
        Some(ExecutionEvent::RunStarted { issue_number: 42, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunCompleted {
            status: ExecutionStatus::Completed,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_lock_happens_only_after_pause() {
    let tracker = tracker([flagged_issue(7)], None);
    let (engine, _) = engine(&tracker);
    let config = default_workflow();
    let probe = tracker.clone();

    let run = engine.handle_event(&config, labeled_event(flagged_issue(7)));
    let check = async move {
        tokio::time::sleep(Duration::from_secs(4)).await;
        let issue = probe.issue(7).unwrap();
        assert_eq!(issue.state, IssueState::Closed);
        assert!(!issue.locked, "lock must wait for the pause");
    };

    let (result, ()) = tokio::join!(run, check);
    let workflow = result.unwrap().unwrap();
    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert!(tracker.issue(7).unwrap().locked);
}
