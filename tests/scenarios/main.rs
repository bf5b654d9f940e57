//! Scenario-based tests for the triage workflow

#[path = "../helpers.rs"]
mod helpers;

mod close_and_lock;
mod concurrency;
mod failure_handling;
mod guard_skip;
mod trigger_gates;
mod visibility_lag;
