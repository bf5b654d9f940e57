//! Core domain models
//!
//! This module defines the data structures behind both descriptors: the
//! pipeline side (events, templates, filters, listener and sink
//! configuration) and the workflow side (issues, trigger, steps, run state).

pub mod condition;
pub mod context;
pub mod event;
pub mod filter;
pub mod issue;
pub mod pipeline_config;
pub mod state;
pub mod step;
pub mod template;
pub mod workflow;
pub mod workflow_config;

pub use condition::{Guard, Trigger, TriggerPredicate, TriggerState};
pub use context::RunContext;
pub use event::Event;
pub use issue::{Issue, IssueEvent, IssueState, LockReason};
pub use state::*;
pub use step::{Step, StepAction};
pub use template::Template;
pub use workflow::Workflow;
