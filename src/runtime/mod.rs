mod context;

pub use context::{ExecutionContext, RunId, StepScope};
