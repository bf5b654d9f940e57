//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::Workflow;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// `owner/name`, when the event carried it
    pub repository: Option<String>,

    /// Triggering issue
    pub issue_number: u64,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub steps_completed: usize,

    pub steps_skipped: usize,

    pub total_steps: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs first, optionally for one workflow
    async fn list_runs(&self, workflow_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// All workflow names with recorded runs
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| workflow_name.map_or(true, |name| r.workflow_name == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished workflow run
pub fn create_summary(workflow: &Workflow) -> RunSummary {
    RunSummary {
        run_id: workflow.state.run_id,
        workflow_name: workflow.name.clone(),
        repository: workflow
            .event
            .as_ref()
            .and_then(|e| e.repository_name())
            .map(str::to_string),
        issue_number: workflow.event.as_ref().map(|e| e.issue.number).unwrap_or(0),
        status: workflow.state.status,
        started_at: workflow.state.started_at.unwrap_or_else(Utc::now),
        completed_at: workflow.state.completed_at,
        steps_completed: workflow.state.completed_steps,
        steps_skipped: workflow.state.skipped_steps,
        total_steps: workflow.state.total_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn summary(workflow: &str, minutes_ago: i64) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            workflow_name: workflow.to_string(),
            repository: Some("acme/widgets".to_string()),
            issue_number: 7,
            status: ExecutionStatus::Completed,
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: Some(Utc::now()),
            steps_completed: 3,
            steps_skipped: 0,
            total_steps: 3,
        }
    }

    #[tokio::test]
    async fn test_in_memory_list_order_and_filter() {
        let store = InMemoryPersistence::new();
        let old = summary("triage", 30);
        let new = summary("triage", 1);
        let other = summary("other", 5);
        for run in [&old, &new, &other] {
            store.save_run(run).await.unwrap();
        }

        let runs = store.list_runs(Some("triage"), 10).await.unwrap();
        assert_eq!(runs, vec![new.clone(), old.clone()]);

        let limited = store.list_runs(None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].run_id, new.run_id);

        assert_eq!(store.list_workflows().await.unwrap(), vec!["other", "triage"]);
        assert_eq!(store.load_run(other.run_id).await.unwrap(), Some(other));
    }
}
