//! Sequential multi-step execution with per-step retry.

mod engine;
mod retry;

pub use engine::{RunState, StepOutcome, WorkflowEngine, WorkflowRun};
