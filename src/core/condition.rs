//! Trigger predicate and step guards

use crate::core::{
    context::RunContext,
    issue::{IssueEvent, IssueState},
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Condition under which a workflow run is instantiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPredicate {
    /// Event name, e.g. `issues`
    pub event: String,

    /// Accepted activity types, e.g. `labeled`
    pub actions: Vec<String>,

    /// Label the issue must currently carry (exact match)
    pub label: String,

    /// State the issue must be in
    pub state: IssueState,
}

impl TriggerPredicate {
    /// Check an event against the predicate
    pub fn matches(&self, event: &IssueEvent) -> bool {
        event.event == self.event
            && self.actions.iter().any(|a| a == &event.action)
            && event.issue.has_label(&self.label)
            && event.issue.state == self.state
    }
}

/// Trigger state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Active,
}

/// Two-state trigger wrapped around a predicate
#[derive(Debug, Clone)]
pub struct Trigger {
    predicate: TriggerPredicate,
    state: TriggerState,
}

impl Trigger {
    pub fn new(predicate: TriggerPredicate) -> Self {
        Self {
            predicate,
            state: TriggerState::Idle,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn predicate(&self) -> &TriggerPredicate {
        &self.predicate
    }

    /// Idle -> Active when the event satisfies the predicate.
    ///
    /// Returns whether the transition happened; an already active trigger
    /// does not fire again until reset.
    pub fn fire(&mut self, event: &IssueEvent) -> bool {
        if self.state == TriggerState::Idle && self.predicate.matches(event) {
            self.state = TriggerState::Active;
            true
        } else {
            false
        }
    }

    /// Back to Idle
    pub fn reset(&mut self) {
        self.state = TriggerState::Idle;
    }
}

/// Errors raised while parsing a guard expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("unsupported guard expression '{0}'")]
    Unsupported(String),
}

/// Reference to a prior step's output, `steps.<id>.outputs.<key>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub step: String,
    pub key: String,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "steps.{}.outputs.{}", self.step, self.key)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// Conditional guard evaluated before a step runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The output is set and truthy
    Truthy(OutputRef),
    /// The output is unset or falsy
    Falsy(OutputRef),
    /// The output compared with a quoted literal
    Compare {
        output: OutputRef,
        op: CompareOp,
        literal: String,
    },
}

fn guard_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(!)?\s*steps\.([A-Za-z0-9_-]+)\.outputs\.([A-Za-z0-9_-]+)(?:\s*(==|!=)\s*'([^']*)')?$",
        )
        .expect("valid guard regex")
    })
}

impl Guard {
    /// Parse a guard expression; `${{ ... }}` wrapping is accepted
    pub fn parse(expression: &str) -> Result<Self, GuardError> {
        let mut expr = expression.trim();
        if let Some(inner) = expr.strip_prefix("${{").and_then(|e| e.strip_suffix("}}")) {
            expr = inner.trim();
        }

        let captures = guard_regex()
            .captures(expr)
            .ok_or_else(|| GuardError::Unsupported(expression.to_string()))?;

        let negated = captures.get(1).is_some();
        let output = OutputRef {
            step: captures[2].to_string(),
            key: captures[3].to_string(),
        };

        match (captures.get(4).map(|m| m.as_str()), captures.get(5)) {
            (None, _) if negated => Ok(Guard::Falsy(output)),
            (None, _) => Ok(Guard::Truthy(output)),
            // `!` applies to a bare reference only
            (Some(_), _) if negated => Err(GuardError::Unsupported(expression.to_string())),
            (Some(op), Some(literal)) => Ok(Guard::Compare {
                output,
                op: if op == "==" { CompareOp::Eq } else { CompareOp::Ne },
                literal: literal.as_str().to_string(),
            }),
            (Some(_), None) => Err(GuardError::Unsupported(expression.to_string())),
        }
    }

    /// The step whose output the guard reads
    pub fn referenced_step(&self) -> &str {
        match self {
            Guard::Truthy(output) | Guard::Falsy(output) | Guard::Compare { output, .. } => {
                &output.step
            }
        }
    }

    /// Evaluate against the accumulated run context
    pub fn evaluate(&self, context: &RunContext) -> bool {
        match self {
            Guard::Truthy(output) => is_truthy(context.get_output(&output.step, &output.key)),
            Guard::Falsy(output) => !is_truthy(context.get_output(&output.step, &output.key)),
            Guard::Compare { output, op, literal } => {
                // Unset outputs compare as the empty string
                let value = context
                    .get_output(&output.step, &output.key)
                    .map(String::as_str)
                    .unwrap_or("");
                match op {
                    CompareOp::Eq => value == literal,
                    CompareOp::Ne => value != literal,
                }
            }
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Truthy(output) => write!(f, "{}", output),
            Guard::Falsy(output) => write!(f, "!{}", output),
            Guard::Compare { output, op, literal } => {
                let op = match op {
                    CompareOp::Eq => "==",
                    CompareOp::Ne => "!=",
                };
                write!(f, "{} {} '{}'", output, op, literal)
            }
        }
    }
}

fn is_truthy(value: Option<&String>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(v.trim(), "" | "false" | "0" | "[]" | "null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::issue::Issue;

    fn predicate() -> TriggerPredicate {
        TriggerPredicate {
            event: "issues".to_string(),
            actions: vec!["labeled".to_string()],
            label: "bot:close".to_string(),
            state: IssueState::Open,
        }
    }

    #[test]
    fn test_trigger_fires_on_matching_event() {
        let mut trigger = Trigger::new(predicate());
        let event = IssueEvent::labeled(Issue::open(7, &["bug", "bot:close"]), "bot:close");

        assert_eq!(trigger.state(), TriggerState::Idle);
        assert!(trigger.fire(&event));
        assert_eq!(trigger.state(), TriggerState::Active);

        // No re-entry while active
        assert!(!trigger.fire(&event));

        trigger.reset();
        assert_eq!(trigger.state(), TriggerState::Idle);
    }

    #[test]
    fn test_trigger_ignores_closed_issue() {
        let mut issue = Issue::open(7, &["bot:close"]);
        issue.state = IssueState::Closed;
        let mut trigger = Trigger::new(predicate());
        assert!(!trigger.fire(&IssueEvent::labeled(issue, "bot:close")));
        assert_eq!(trigger.state(), TriggerState::Idle);
    }

    #[test]
    fn test_trigger_requires_label_on_issue() {
        // Another label was added; bot:close is not on the issue
        let event = IssueEvent::labeled(Issue::open(7, &["bug"]), "bug");
        assert!(!predicate().matches(&event));
    }

    #[test]
    fn test_trigger_requires_action() {
        let mut event = IssueEvent::labeled(Issue::open(7, &["bot:close"]), "bot:close");
        event.action = "unlabeled".to_string();
        assert!(!predicate().matches(&event));

        event.action = "labeled".to_string();
        event.event = "pull_request".to_string();
        assert!(!predicate().matches(&event));
    }

    #[test]
    fn test_parse_guards() {
        assert_eq!(
            Guard::parse("steps.close.outputs.closed == 'true'").unwrap(),
            Guard::Compare {
                output: OutputRef {
                    step: "close".to_string(),
                    key: "closed".to_string()
                },
                op: CompareOp::Eq,
                literal: "true".to_string(),
            }
        );
        assert_eq!(
            Guard::parse("${{ steps.stale.outputs.closed-issues-prs != '[]' }}")
                .unwrap()
                .referenced_step(),
            "stale"
        );
        assert!(matches!(
            Guard::parse("!steps.close.outputs.closed").unwrap(),
            Guard::Falsy(_)
        ));
        assert!(Guard::parse("github.event.issue.state == 'open'").is_err());
        assert!(Guard::parse("!steps.a.outputs.b == 'x'").is_err());
    }

    #[test]
    fn test_evaluate_guards() {
        let mut ctx = RunContext::new();
        ctx.set_output("close", "closed", "true".to_string());
        ctx.set_output("close", "closed-issues", "[]".to_string());

        assert!(Guard::parse("steps.close.outputs.closed == 'true'").unwrap().evaluate(&ctx));
        assert!(Guard::parse("steps.close.outputs.closed").unwrap().evaluate(&ctx));
        assert!(!Guard::parse("steps.close.outputs.closed-issues").unwrap().evaluate(&ctx));
        assert!(Guard::parse("!steps.close.outputs.closed-issues").unwrap().evaluate(&ctx));
        assert!(!Guard::parse("steps.other.outputs.closed == 'true'").unwrap().evaluate(&ctx));
        assert!(Guard::parse("steps.other.outputs.closed != 'true'").unwrap().evaluate(&ctx));
    }
}
