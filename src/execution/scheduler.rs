//! Run dispatcher - decides how many workflow runs execute at once

use crate::{
    core::{issue::IssueEvent, workflow::Workflow, workflow_config::WorkflowConfig},
    execution::WorkflowEngine,
    tracker::IssueTracker,
};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Strategy for scheduling independent runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One run at a time, in event order
    #[default]
    Sequential,

    /// Every run at once
    Parallel,

    /// At most N concurrent runs
    LimitedParallel(usize),
}

/// Dispatches events to a shared engine as independent runs
///
/// Steps inside a run are always sequential; the strategy only governs
/// how runs for different events overlap.
pub struct RunDispatcher<T> {
    engine: Arc<WorkflowEngine<T>>,
    config: Arc<WorkflowConfig>,
    strategy: SchedulingStrategy,
}

impl<T: IssueTracker + 'static> RunDispatcher<T> {
    pub fn new(engine: Arc<WorkflowEngine<T>>, config: WorkflowConfig, strategy: SchedulingStrategy) -> Self {
        Self {
            engine,
            config: Arc::new(config),
            strategy,
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Handle every event; results are returned in event order
    pub async fn dispatch(&self, events: Vec<IssueEvent>) -> Vec<Result<Option<Workflow>>> {
        let limit = match self.strategy {
            SchedulingStrategy::Sequential => {
                let mut results = Vec::with_capacity(events.len());
                for event in events {
                    results.push(self.engine.handle_event(&self.config, event).await);
                }
                return results;
            }
            SchedulingStrategy::Parallel => events.len().max(1),
            SchedulingStrategy::LimitedParallel(max) => max.max(1),
        };

        debug!("Dispatching {} events with up to {} concurrent runs", events.len(), limit);

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let total = events.len();

        for (index, event) in events.into_iter().enumerate() {
            let engine = self.engine.clone();
            let config = self.config.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => engine.handle_event(&config, event).await,
                    Err(e) => Err(anyhow!("dispatcher closed: {}", e)),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Option<Workflow>>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => debug!("Run task failed to join: {}", e),
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(anyhow!("run task panicked or was cancelled"))))
            .collect()
    }
}
