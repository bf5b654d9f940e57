//! Issue tracker access for the triage workflow

pub mod client;
pub mod error;
pub mod github;
pub mod memory;

use crate::core::{
    issue::{Issue, LockReason},
    step::CloseReason,
};
use async_trait::async_trait;
use std::sync::Arc;

pub use client::{TrackerClientConfig, DEFAULT_API_URL};
pub use error::TrackerError;
pub use github::GitHubClient;
pub use memory::{InMemoryTracker, TrackerCall, TrackerOp};

/// Operations the workflow actions perform against an issue tracker
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch the current state of an issue
    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError>;

    /// Close an issue
    async fn close_issue(&self, number: u64, reason: CloseReason) -> Result<(), TrackerError>;

    /// Add labels to an issue
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError>;

    /// Remove a label; removing a label the issue does not carry is not an error
    async fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError>;

    /// Post a comment
    async fn create_comment(&self, number: u64, body: &str) -> Result<(), TrackerError>;

    /// Lock the conversation
    async fn lock_issue(&self, number: u64, reason: Option<LockReason>) -> Result<(), TrackerError>;
}

#[async_trait]
impl<T: IssueTracker + ?Sized> IssueTracker for Arc<T> {
    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        (**self).get_issue(number).await
    }

    async fn close_issue(&self, number: u64, reason: CloseReason) -> Result<(), TrackerError> {
        (**self).close_issue(number, reason).await
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        (**self).add_labels(number, labels).await
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError> {
        (**self).remove_label(number, label).await
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), TrackerError> {
        (**self).create_comment(number, body).await
    }

    async fn lock_issue(&self, number: u64, reason: Option<LockReason>) -> Result<(), TrackerError> {
        (**self).lock_issue(number, reason).await
    }
}
