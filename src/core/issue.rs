//! Issue tracker entities and the webhook event that triggers a workflow run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Issue open/closed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueState::Open => f.write_str("open"),
            IssueState::Closed => f.write_str("closed"),
        }
    }
}

/// Reason recorded when locking an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockReason {
    #[serde(rename = "off-topic")]
    OffTopic,
    #[serde(rename = "too heated")]
    TooHeated,
    #[serde(rename = "resolved")]
    Resolved,
    #[serde(rename = "spam")]
    Spam,
}

impl LockReason {
    /// Wire name used by the GitHub API
    pub fn as_str(&self) -> &'static str {
        match self {
            LockReason::OffTopic => "off-topic",
            LockReason::TooHeated => "too heated",
            LockReason::Resolved => "resolved",
            LockReason::Spam => "spam",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue as seen by the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,

    #[serde(default)]
    pub title: String,

    pub state: IssueState,

    /// Label names (GitHub sends label objects; both forms are accepted)
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: Vec<String>,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Create an open issue with the given labels
    pub fn open(number: u64, labels: &[&str]) -> Self {
        Self {
            number,
            title: String::new(),
            state: IssueState::Open,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            locked: false,
            updated_at: None,
        }
    }

    /// Exact-match label lookup
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn is_open(&self) -> bool {
        self.state == IssueState::Open
    }
}

/// A label object from a webhook payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Repository reference from a webhook payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

/// An `issues` webhook event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvent {
    /// Event name (`issues`); webhook payloads do not carry it, so it
    /// defaults to `issues`
    #[serde(default = "default_event_name")]
    pub event: String,

    /// Activity type, e.g. `labeled`
    pub action: String,

    /// The issue as of the event
    pub issue: Issue,

    /// The label that was added or removed, for label activity
    #[serde(default)]
    pub label: Option<Label>,

    #[serde(default)]
    pub repository: Option<Repository>,
}

fn default_event_name() -> String {
    "issues".to_string()
}

impl IssueEvent {
    /// Build a `labeled` event for an issue
    pub fn labeled(issue: Issue, label: &str) -> Self {
        Self {
            event: default_event_name(),
            action: "labeled".to_string(),
            issue,
            label: Some(Label {
                name: label.to_string(),
            }),
            repository: None,
        }
    }

    pub fn with_repository(mut self, full_name: &str) -> Self {
        self.repository = Some(Repository {
            full_name: full_name.to_string(),
        });
        self
    }

    /// Parse a webhook payload
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository.as_ref().map(|r| r.full_name.as_str())
    }
}

fn deserialize_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LabelRepr {
        Name(String),
        Object(Label),
    }

    let labels: Option<Vec<LabelRepr>> = Option::deserialize(deserializer)?;
    Ok(labels
        .unwrap_or_default()
        .into_iter()
        .map(|l| match l {
            LabelRepr::Name(name) => name,
            LabelRepr::Object(label) => label.name,
        })
        .collect())
}
