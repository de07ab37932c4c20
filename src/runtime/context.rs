use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Result, ScrapeError, common::Vars, resolver, utils};

pub type RunId = String;

/// Values a completed step leaves behind for later steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepScope {
    /// inputs the step was executed with
    pub params: Vars,
    /// values pulled from the step's response by its `extract` map
    pub extracted: Vars,
    /// the step's extracted response data
    pub data: Value,
}

/// Per-run store of caller params and completed step outputs.
///
/// A context is created for one template or workflow run, grows append-only
/// as steps complete, and is dropped when the run ends. Nothing in it is shared
/// between runs, so concurrent runs never observe each other.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    run_id: RunId,
    params: Vars,
    steps: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(params: Vars) -> Self {
        Self {
            run_id: utils::longid(),
            params,
            steps: Map::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn params(&self) -> &Vars {
        &self.params
    }

    /// Record the scope of a completed step. A step name can be recorded once.
    pub fn add_step(
        &mut self,
        name: &str,
        scope: StepScope,
    ) -> Result<()> {
        if self.steps.contains_key(name) {
            return Err(ScrapeError::ConfigurationError(format!("step '{}' already recorded in run {}", name, self.run_id)));
        }
        self.steps.insert(name.to_string(), serde_json::to_value(scope)?);
        Ok(())
    }

    /// The values extracted by step `name`, if it completed.
    pub fn extracted(
        &self,
        name: &str,
    ) -> Option<Vars> {
        self.steps.get(name).and_then(|s| s.get("extracted")).cloned().map(Vars::from)
    }

    /// The JSON root path expressions resolve against:
    /// `{"params": {...}, "steps": {"<name>": {"params", "extracted", "data"}}}`.
    pub fn root(&self) -> Value {
        serde_json::json!({
            "params": self.params,
            "steps": self.steps,
        })
    }

    /// Resolve a (possibly composite) expression against this context.
    pub fn resolve(
        &self,
        expr: &Value,
    ) -> Result<Value> {
        resolver::resolve_value(&self.root(), expr)
    }

    /// Resolve every value of an input map against this context.
    pub fn resolve_vars(
        &self,
        vars: &Vars,
    ) -> Result<Vars> {
        resolver::resolve_vars(&self.root(), vars)
    }

    /// Snapshot handed to the history sink.
    pub fn snapshot(&self) -> Value {
        self.root()
    }
}
