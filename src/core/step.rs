//! Step domain model

use crate::core::{
    condition::Guard,
    issue::LockReason,
    state::StepState,
    workflow_config::StepConfig,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Built-in action versions this build understands
const SUPPORTED_MAJOR: &str = "v1";

/// `<name>@<version>` reference to a built-in action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub name: String,
    pub version: String,
}

impl ActionRef {
    pub fn parse(uses: &str) -> Result<Self> {
        let (name, version) = uses
            .split_once('@')
            .with_context(|| format!("Action '{}' must be pinned as <name>@<version>", uses))?;
        if name.is_empty() || version.is_empty() {
            anyhow::bail!("Action '{}' must be pinned as <name>@<version>", uses);
        }
        if version != SUPPORTED_MAJOR && !version.starts_with(&format!("{}.", SUPPORTED_MAJOR)) {
            anyhow::bail!(
                "Action '{}' pins unsupported version '{}' (supported: {})",
                name,
                version,
                SUPPORTED_MAJOR
            );
        }
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// How a closed issue is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Completed,
    NotPlanned,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::NotPlanned => "not_planned",
        }
    }
}

/// Parameters of `close-and-label`
///
/// Staleness thresholds follow the usual stale-bot convention: a negative
/// `days-before-issue-stale` never marks issues stale by age, so only issues
/// that already carry the stale label qualify; `days-before-issue-close: 0`
/// closes them as soon as they are stale, a negative value never closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CloseParams {
    /// Label that marks an issue stale (defaults to the trigger label)
    #[serde(default)]
    pub stale_label: Option<String>,

    #[serde(default = "default_days_before_stale")]
    pub days_before_issue_stale: i64,

    #[serde(default)]
    pub days_before_issue_close: i64,

    /// Label added when closing
    #[serde(default)]
    pub close_issue_label: Option<String>,

    /// Comment posted when closing (supports `{{ ... }}` placeholders)
    #[serde(default)]
    pub close_issue_message: Option<String>,

    #[serde(default = "default_close_reason")]
    pub close_issue_reason: CloseReason,

    /// Remove the stale label as part of closing
    #[serde(default)]
    pub remove_stale_label: bool,
}

/// Parameters of `pause`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PauseParams {
    #[serde(default = "default_pause_seconds")]
    pub seconds: f64,
}

impl PauseParams {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds)
    }
}

/// Parameters of `lock`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LockParams {
    /// Label removed before locking
    #[serde(default)]
    pub remove_label: Option<String>,

    #[serde(default)]
    pub lock_reason: Option<LockReason>,

    /// Refuse to lock an issue the tracker still reports as open
    #[serde(default = "default_true")]
    pub only_closed: bool,

    /// Line logged after locking (supports `{{ ... }}` placeholders)
    #[serde(default)]
    pub log_message: Option<String>,
}

fn default_days_before_stale() -> i64 {
    -1
}

fn default_close_reason() -> CloseReason {
    CloseReason::NotPlanned
}

fn default_pause_seconds() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

/// What a step does
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Close the triggering issue, label it and comment
    CloseAndLabel(CloseParams),
    /// Fixed delay
    Pause(PauseParams),
    /// Remove a label and lock the issue
    Lock(LockParams),
}

impl StepAction {
    /// Whether the action writes to the issue tracker
    pub fn mutates_issues(&self) -> bool {
        !matches!(self, StepAction::Pause(_))
    }
}

/// A single workflow step
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Pinned action reference
    pub action_ref: ActionRef,

    /// Action with typed parameters
    pub action: StepAction,

    /// Guard evaluated before the step runs (None = always run)
    pub guard: Option<Guard>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from its configuration
    ///
    /// `trigger_label` fills in label parameters the step leaves unset.
    pub fn from_config(config: &StepConfig, trigger_label: &str) -> Result<Self> {
        let action_ref = ActionRef::parse(&config.uses)
            .with_context(|| format!("Step '{}'", config.id))?;

        let with = serde_yaml::Value::Mapping(
            config
                .with
                .iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
                .collect(),
        );

        let action = match action_ref.name.as_str() {
            "close-and-label" => {
                let mut params: CloseParams = serde_yaml::from_value(with)
                    .with_context(|| format!("Step '{}': invalid parameters", config.id))?;
                if params.stale_label.is_none() {
                    params.stale_label = Some(trigger_label.to_string());
                }
                StepAction::CloseAndLabel(params)
            }
            "pause" => {
                let params: PauseParams = serde_yaml::from_value(with)
                    .with_context(|| format!("Step '{}': invalid parameters", config.id))?;
                if !params.seconds.is_finite() || params.seconds < 0.0 {
                    anyhow::bail!(
                        "Step '{}': pause seconds must be a non-negative number",
                        config.id
                    );
                }
                StepAction::Pause(params)
            }
            "lock" => {
                let params: LockParams = serde_yaml::from_value(with)
                    .with_context(|| format!("Step '{}': invalid parameters", config.id))?;
                StepAction::Lock(params)
            }
            other => anyhow::bail!("Step '{}' uses unknown action '{}'", config.id, other),
        };

        let guard = config
            .guard
            .as_deref()
            .map(Guard::parse)
            .transpose()
            .with_context(|| format!("Step '{}': invalid guard", config.id))?;

        Ok(Step {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            action_ref,
            action,
            guard,
            state: StepState::Pending,
        })
    }
}
