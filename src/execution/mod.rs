//! Workflow execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEvent, WorkflowEngine, HALTED_REASON};
pub use executor::{ExecutionResult, StepError, StepExecutor};
pub use scheduler::{RunDispatcher, SchedulingStrategy};
