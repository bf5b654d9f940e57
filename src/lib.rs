//! logship - log ingestion pipeline and issue triage automation

pub mod cli;
pub mod core;
pub mod execution;
pub mod ingest;
pub mod output;
pub mod persistence;
pub mod service;
pub mod shipper;
pub mod tracker;

// Re-export commonly used types
pub use core::pipeline_config::PipelineConfig;
pub use core::workflow_config::WorkflowConfig;
pub use core::{Event, ExecutionStatus, Issue, IssueEvent, Step, StepState, Workflow};
pub use execution::{ExecutionEvent, RunDispatcher, SchedulingStrategy, WorkflowEngine};
pub use output::{OutputError, Sink};
pub use service::PipelineService;
pub use shipper::{ShipError, Shipper};
pub use tracker::{GitHubClient, InMemoryTracker, IssueTracker, TrackerClientConfig, TrackerError};
