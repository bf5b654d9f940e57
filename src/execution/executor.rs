//! Step executor - runs individual steps against the issue tracker

use crate::{
    core::{
        context::RunContext,
        issue::Issue,
        step::{CloseParams, LockParams, PauseParams, Step, StepAction},
    },
    tracker::{IssueTracker, TrackerError},
};
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info};

/// Error types for step execution
#[derive(Debug, Error)]
pub enum StepError {
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("issue #{0} is still reported open, refusing to lock")]
    StillOpen(u64),
}

/// Result of executing a step
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Step completed successfully
    Success { outputs: HashMap<String, String> },
    /// Step failed; the run halts
    Failed { error: String },
}

/// Executes a single step
pub struct StepExecutor<T> {
    tracker: T,
}

impl<T: IssueTracker> StepExecutor<T> {
    pub fn new(tracker: T) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Execute a step for an issue and return the result
    pub async fn execute(&self, step: &Step, issue_number: u64, context: &RunContext) -> ExecutionResult {
        info!("Executing step: {} ({})", step.id, step.action_ref);

        let result = match &step.action {
            StepAction::CloseAndLabel(params) => self.close_and_label(params, issue_number, context).await,
            StepAction::Pause(params) => self.pause(params).await,
            StepAction::Lock(params) => self.lock(params, issue_number, context).await,
        };

        match result {
            Ok(outputs) => {
                debug!("Step {} outputs: {:?}", step.id, outputs);
                ExecutionResult::Success { outputs }
            }
            Err(e) => {
                error!("Step {} failed: {}", step.id, e);
                ExecutionResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn close_and_label(
        &self,
        params: &CloseParams,
        number: u64,
        context: &RunContext,
    ) -> Result<HashMap<String, String>, StepError> {
        let issue = self.tracker.get_issue(number).await?;
        let mut outputs = HashMap::new();

        let closed = match stale_decision(params, &issue) {
            StaleDecision::Skip(reason) => {
                info!("Issue #{} not closed: {}", number, reason);
                false
            }
            StaleDecision::MarkStale => {
                if let Some(label) = &params.stale_label {
                    info!("Marking issue #{} stale", number);
                    self.tracker.add_labels(number, &[label.clone()]).await?;
                }
                outputs.insert("staled-issues".to_string(), format!("[{}]", number));
                false
            }
            StaleDecision::Close => {
                if let Some(message) = &params.close_issue_message {
                    self.tracker
                        .create_comment(number, &context.render(message))
                        .await?;
                }
                if let Some(label) = &params.close_issue_label {
                    self.tracker.add_labels(number, &[label.clone()]).await?;
                }
                self.tracker
                    .close_issue(number, params.close_issue_reason)
                    .await?;
                if params.remove_stale_label {
                    if let Some(label) = &params.stale_label {
                        self.tracker.remove_label(number, label).await?;
                    }
                }
                info!("Closed issue #{} as {}", number, params.close_issue_reason.as_str());
                true
            }
        };

        outputs.insert("closed".to_string(), closed.to_string());
        outputs.insert(
            "closed-issues".to_string(),
            if closed {
                format!("[{}]", number)
            } else {
                "[]".to_string()
            },
        );
        Ok(outputs)
    }

    async fn pause(&self, params: &PauseParams) -> Result<HashMap<String, String>, StepError> {
        debug!("Pausing for {:?}", params.duration());
        tokio::time::sleep(params.duration()).await;
        Ok(HashMap::new())
    }

    async fn lock(
        &self,
        params: &LockParams,
        number: u64,
        context: &RunContext,
    ) -> Result<HashMap<String, String>, StepError> {
        let issue = self.tracker.get_issue(number).await?;
        if params.only_closed && issue.is_open() {
            return Err(StepError::StillOpen(number));
        }

        if let Some(label) = &params.remove_label {
            self.tracker.remove_label(number, label).await?;
        }
        self.tracker.lock_issue(number, params.lock_reason).await?;

        if let Some(message) = &params.log_message {
            info!("{}", context.render(message));
        }

        let mut outputs = HashMap::new();
        outputs.insert("locked".to_string(), "true".to_string());
        Ok(outputs)
    }
}

/// Outcome of the staleness policy for one issue
#[derive(Debug, Clone, PartialEq, Eq)]
enum StaleDecision {
    Skip(&'static str),
    MarkStale,
    Close,
}

fn stale_decision(params: &CloseParams, issue: &Issue) -> StaleDecision {
    if !issue.is_open() {
        return StaleDecision::Skip("issue is not open");
    }
    if issue.locked {
        return StaleDecision::Skip("issue is locked");
    }

    let idle_days = issue
        .updated_at
        .map(|t| (Utc::now() - t).num_days())
        .unwrap_or(0);

    let labelled = params
        .stale_label
        .as_deref()
        .is_some_and(|label| issue.has_label(label));

    if !labelled {
        if params.days_before_issue_stale < 0 {
            return StaleDecision::Skip("not marked stale");
        }
        if idle_days < params.days_before_issue_stale {
            return StaleDecision::Skip("not idle long enough to be stale");
        }
        if params.days_before_issue_close != 0 {
            return StaleDecision::MarkStale;
        }
    }

    if params.days_before_issue_close < 0 {
        return StaleDecision::Skip("closing is disabled");
    }
    if labelled && idle_days < params.days_before_issue_close {
        return StaleDecision::Skip("stale but not idle long enough to close");
    }
    StaleDecision::Close
}
