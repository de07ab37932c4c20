use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Result, ScrapeError, common::Vars};

/// Longest sleep a step may ask for, in seconds.
pub const MAX_SLEEP_SECS: f64 = 3600.0;

/// Sleep window between attempts of a step and after it succeeds, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

impl SleepRange {
    pub fn new(
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            min,
            max,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max <= 0.0
    }

    fn check(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min < 0.0 {
            return Err(ScrapeError::ConfigurationError(format!("sleep min must be a finite value >= 0, got {}", self.min)));
        }
        if self.max < self.min {
            return Err(ScrapeError::ConfigurationError(format!("sleep max {} is lower than min {}", self.max, self.min)));
        }
        if self.max > MAX_SLEEP_SECS {
            return Err(ScrapeError::ConfigurationError(format!("sleep max {} exceeds {} seconds", self.max, MAX_SLEEP_SECS)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepModel {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "template_name", alias = "template")]
    pub template_ref: String,
    /// param name → expression, resolved against the run context
    #[serde(default)]
    pub input: Vars,
    /// key → expression, resolved against the step's response data
    #[serde(default)]
    pub extract: Vars,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default)]
    pub sleep: SleepRange,
}

fn default_retry() -> u32 {
    3
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowModel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepModel>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let workflow: Self = super::parse_validated(s, &Self::schema())?;
        workflow.normalize()
    }

    /// Name unnamed steps `step{i}` and check retry, sleep and name uniqueness.
    pub fn normalize(mut self) -> Result<Self> {
        if self.id.is_empty() {
            self.id = self.name.clone();
        }
        if self.steps.is_empty() {
            return Err(ScrapeError::ConfigurationError(format!("workflow '{}' has no steps", self.name)));
        }

        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter_mut().enumerate() {
            if step.name.trim().is_empty() {
                step.name = format!("step{}", i + 1);
            }
            if !seen.insert(step.name.clone()) {
                return Err(ScrapeError::ConfigurationError(format!("duplicate step name '{}' in workflow '{}'", step.name, self.name)));
            }
            if step.retry < 1 {
                return Err(ScrapeError::ConfigurationError(format!("step '{}' retry must be >= 1", step.name)));
            }
            step.sleep.check()?;
        }
        Ok(self)
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "steps"],
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string", "minLength": 1 },
                "description": { "type": "string" },
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "anyOf": [
                            { "required": ["template_ref"] },
                            { "required": ["template_name"] },
                            { "required": ["template"] }
                        ],
                        "properties": {
                            "name": { "type": "string" },
                            "template_ref": { "type": "string", "minLength": 1 },
                            "template_name": { "type": "string", "minLength": 1 },
                            "template": { "type": "string", "minLength": 1 },
                            "input": { "type": "object" },
                            "extract": { "type": "object" },
                            "retry": { "type": "integer", "minimum": 1 },
                            "sleep": {
                                "type": "object",
                                "properties": {
                                    "min": { "type": "number", "minimum": 0 },
                                    "max": { "type": "number", "minimum": 0 }
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}
