use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Result, ScrapeError};

/// What a batch task runs for each row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum BatchTarget {
    Template(String),
    Workflow(String),
}

/// Fields of an item result written into its artifact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaveField {
    Success,
    Error,
    Data,
    RawResponse,
    Request,
}

impl SaveField {
    pub fn all() -> Vec<SaveField> {
        vec![SaveField::Success, SaveField::Error, SaveField::Data, SaveField::RawResponse, SaveField::Request]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BatchTaskModel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub target: BatchTarget,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// pause between two items of the same worker
    #[serde(default)]
    pub sleep_ms: u64,
    #[serde(default)]
    pub output_dir: String,
    #[serde(default)]
    pub csv_text: String,
    #[serde(default = "SaveField::all")]
    pub save_fields: Vec<SaveField>,
    #[serde(default)]
    pub data_json_path: Option<String>,
}

fn default_concurrency() -> usize {
    1
}

impl BatchTaskModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let task: Self = super::parse_validated(s, &Self::schema())?;
        task.normalize()
    }

    pub fn normalize(mut self) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(ScrapeError::ConfigurationError("batch task name is required".to_string()));
        }
        if self.concurrency < 1 {
            return Err(ScrapeError::ConfigurationError(format!("batch task '{}' concurrency must be >= 1", self.name)));
        }
        if self.data_json_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            self.data_json_path = None;
        }
        Ok(self)
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "target"],
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string", "minLength": 1 },
                "target": {
                    "type": "object",
                    "required": ["kind", "ref"],
                    "properties": {
                        "kind": { "type": "string", "enum": ["template", "workflow"] },
                        "ref": { "type": "string", "minLength": 1 }
                    }
                },
                "concurrency": { "type": "integer", "minimum": 1 },
                "sleep_ms": { "type": "integer", "minimum": 0 },
                "output_dir": { "type": "string" },
                "csv_text": { "type": "string" },
                "save_fields": {
                    "type": "array",
                    "items": { "type": "string", "enum": ["success", "error", "data", "raw_response", "request"] }
                },
                "data_json_path": { "type": ["string", "null"] }
            }
        })
    }
}
