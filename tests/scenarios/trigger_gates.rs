//! Test: trigger predicate and per-issue run exclusivity

use crate::helpers::*;
use logship::core::{ExecutionStatus, Issue, IssueState};

#[tokio::test]
async fn test_event_without_trigger_label_does_nothing() {
    let tracker = tracker([Issue::open(1, &["bug"])], None);
    let (engine, events) = engine(&tracker);

    let event = logship::core::IssueEvent::labeled(Issue::open(1, &["bug"]), "bug");
    let result = engine.handle_event(&default_workflow(), event).await.unwrap();

    assert!(result.is_none());
    assert!(tracker.calls().is_empty());
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_issue_does_not_trigger() {
    let mut issue = flagged_issue(2);
    issue.state = IssueState::Closed;
    let tracker = tracker([issue.clone()], None);
    let (engine, _) = engine(&tracker);

    let result = engine
        .handle_event(&default_workflow(), labeled_event(issue))
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(tracker.calls().is_empty());
}

#[tokio::test]
async fn test_other_activity_types_do_not_trigger() {
    let tracker = tracker([flagged_issue(3)], None);
    let (engine, _) = engine(&tracker);

    for action in ["opened", "unlabeled", "edited"] {
        let mut event = labeled_event(flagged_issue(3));
        event.action = action.to_string();
        let result = engine.handle_event(&default_workflow(), event).await.unwrap();
        assert!(result.is_none(), "{} should not trigger", action);
    }

    let mut event = labeled_event(flagged_issue(3));
    event.event = "pull_request".to_string();
    assert!(engine
        .handle_event(&default_workflow(), event)
        .await
        .unwrap()
        .is_none());
    assert!(tracker.calls().is_empty());
}

#[tokio::test]
async fn test_trigger_label_must_match_exactly() {
    let tracker = tracker([Issue::open(4, &["bot:closed", "Bot:Close"])], None);
    let (engine, _) = engine(&tracker);

    let event = labeled_event(Issue::open(4, &["bot:closed", "Bot:Close"]));
    assert!(engine
        .handle_event(&default_workflow(), event)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_events_for_same_issue_start_one_run() {
    let tracker = tracker([flagged_issue(5)], None);
    let (engine, _) = engine(&tracker);
    let config = default_workflow();

    let (first, second) = tokio::join!(
        engine.handle_event(&config, labeled_event(flagged_issue(5))),
        engine.handle_event(&config, labeled_event(flagged_issue(5))),
    );
    let runs: Vec<_> = [first.unwrap(), second.unwrap()].into_iter().flatten().collect();

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state.status, ExecutionStatus::Completed);
    assert!(tracker.issue(5).unwrap().locked);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_rearms_after_run() {
    let tracker = tracker([flagged_issue(6)], None);
    let (engine, _) = engine(&tracker);
    let config = default_workflow();

    let first = engine
        .handle_event(&config, labeled_event(flagged_issue(6)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output(&first, "close", "closed").as_deref(), Some("true"));

    // A late duplicate delivery still carries the open snapshot
    let second = engine
        .handle_event(&config, labeled_event(flagged_issue(6)))
        .await
        .unwrap()
        .expect("trigger should be idle again");

    assert_eq!(second.state.status, ExecutionStatus::Completed);
    assert_eq!(output(&second, "close", "closed").as_deref(), Some("false"));
    assert_skipped(&second, "pause");
    assert_skipped(&second, "lock");
    assert_ne!(first.state.run_id, second.state.run_id);
}
