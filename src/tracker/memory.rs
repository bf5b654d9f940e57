//! In-memory issue tracker for tests and dry runs

use crate::core::{
    issue::{Issue, IssueState, LockReason},
    step::CloseReason,
};
use crate::tracker::{IssueTracker, TrackerError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// A recorded tracker call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    GetIssue(u64),
    CloseIssue(u64, CloseReason),
    AddLabels(u64, Vec<String>),
    RemoveLabel(u64, String),
    CreateComment(u64, String),
    LockIssue(u64, Option<LockReason>),
}

/// Tracker operation kinds, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOp {
    GetIssue,
    CloseIssue,
    AddLabels,
    RemoveLabel,
    CreateComment,
    LockIssue,
}

#[derive(Debug, Default)]
struct Inner {
    issues: HashMap<u64, Issue>,
    /// What readers see until the write becomes visible
    stale: HashMap<u64, (Issue, Instant)>,
    comments: HashMap<u64, Vec<String>>,
    calls: Vec<TrackerCall>,
    failing: HashSet<TrackerOp>,
}

/// Issue tracker that keeps issues in memory
///
/// With a visibility delay, reads keep returning the issue as it was before
/// the most recent write until the delay has passed, like an eventually
/// consistent API.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    inner: Mutex<Inner>,
    visibility_delay: Duration,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with issues
    pub fn with_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let tracker = Self::new();
        {
            let mut inner = tracker.lock();
            for issue in issues {
                inner.issues.insert(issue.number, issue);
            }
        }
        tracker
    }

    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = delay;
        self
    }

    /// Make every call of the given kind fail with a 500
    pub fn fail_on(&self, op: TrackerOp) {
        self.lock().failing.insert(op);
    }

    pub fn insert(&self, issue: Issue) {
        self.lock().issues.insert(issue.number, issue);
    }

    /// Current (fully visible) state of an issue
    pub fn issue(&self, number: u64) -> Option<Issue> {
        self.lock().issues.get(&number).cloned()
    }

    pub fn comments(&self, number: u64) -> Vec<String> {
        self.lock().comments.get(&number).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, op: TrackerOp, call: TrackerCall) -> Result<MutexGuard<'_, Inner>, TrackerError> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.failing.contains(&op) {
            return Err(TrackerError::Api {
                status: 500,
                message: format!("injected failure for {:?}", op),
            });
        }
        Ok(inner)
    }

    /// Apply a write, keeping the previous snapshot visible for the delay
    fn write<F>(&self, inner: &mut Inner, number: u64, mutate: F) -> Result<(), TrackerError>
    where
        F: FnOnce(&mut Issue),
    {
        let issue = inner
            .issues
            .get_mut(&number)
            .ok_or(TrackerError::NotFound(number))?;

        if !self.visibility_delay.is_zero() {
            let visible_at = Instant::now() + self.visibility_delay;
            let snapshot = match inner.stale.get(&number) {
                Some((old, until)) if *until > Instant::now() => old.clone(),
                _ => issue.clone(),
            };
            inner.stale.insert(number, (snapshot, visible_at));
        }

        mutate(issue);
        issue.updated_at = Some(chrono::Utc::now());
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for InMemoryTracker {
    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        let inner = self.begin(TrackerOp::GetIssue, TrackerCall::GetIssue(number))?;
        if let Some((snapshot, visible_at)) = inner.stale.get(&number) {
            if Instant::now() < *visible_at {
                return Ok(snapshot.clone());
            }
        }
        inner
            .issues
            .get(&number)
            .cloned()
            .ok_or(TrackerError::NotFound(number))
    }

    async fn close_issue(&self, number: u64, reason: CloseReason) -> Result<(), TrackerError> {
        let mut inner = self.begin(TrackerOp::CloseIssue, TrackerCall::CloseIssue(number, reason))?;
        self.write(&mut inner, number, |issue| issue.state = IssueState::Closed)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        let mut inner = self.begin(
            TrackerOp::AddLabels,
            TrackerCall::AddLabels(number, labels.to_vec()),
        )?;
        self.write(&mut inner, number, |issue| {
            for label in labels {
                if !issue.has_label(label) {
                    issue.labels.push(label.clone());
                }
            }
        })
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError> {
        let mut inner = self.begin(
            TrackerOp::RemoveLabel,
            TrackerCall::RemoveLabel(number, label.to_string()),
        )?;
        self.write(&mut inner, number, |issue| issue.labels.retain(|l| l != label))
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), TrackerError> {
        let mut inner = self.begin(
            TrackerOp::CreateComment,
            TrackerCall::CreateComment(number, body.to_string()),
        )?;
        if !inner.issues.contains_key(&number) {
            return Err(TrackerError::NotFound(number));
        }
        inner
            .comments
            .entry(number)
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn lock_issue(&self, number: u64, reason: Option<LockReason>) -> Result<(), TrackerError> {
        let mut inner = self.begin(TrackerOp::LockIssue, TrackerCall::LockIssue(number, reason))?;
        self.write(&mut inner, number, |issue| issue.locked = true)
    }
}
