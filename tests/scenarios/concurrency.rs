//! Test: independent runs dispatched concurrently

use crate::helpers::*;
use logship::core::ExecutionStatus;
use logship::execution::{RunDispatcher, SchedulingStrategy};
use std::sync::Arc;
use std::time::Duration;

async fn dispatch_four(strategy: SchedulingStrategy) -> Duration {
    let issues: Vec<_> = (30..34).map(flagged_issue).collect();
    let tracker = tracker(issues.clone(), None);
    let (engine, _) = engine(&tracker);
    let dispatcher = RunDispatcher::new(Arc::new(engine), default_workflow(), strategy);

    let started = tokio::time::Instant::now();
    let results = dispatcher
        .dispatch(issues.into_iter().map(labeled_event).collect())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 4);
    for (result, number) in results.into_iter().zip(30..34) {
        let workflow = result.unwrap().expect("each issue gets its own run");
        assert_eq!(workflow.state.status, ExecutionStatus::Completed);
        assert_eq!(workflow.event.as_ref().unwrap().issue.number, number);
        assert!(tracker.issue(number).unwrap().locked);
    }
    elapsed
}

#[tokio::test(start_paused = true)]
async fn test_parallel_runs_overlap_pauses() {
    let elapsed = dispatch_four(SchedulingStrategy::Parallel).await;
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_limited_parallel_runs_in_waves() {
    let elapsed = dispatch_four(SchedulingStrategy::LimitedParallel(2)).await;
    assert!(elapsed >= Duration::from_secs(10), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(15), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_runs_one_at_a_time() {
    let elapsed = dispatch_four(SchedulingStrategy::Sequential).await;
    assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
}
