//! Declarative definitions: templates, workflows, header groups, proxies and batch tasks.
//!
//! Every model parses from JSON with `from_json`, which validates the document
//! against the model's JSON schema before deserializing and then applies the
//! semantic checks serde cannot express.

mod batch;
mod header_group;
mod template;
mod workflow;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;

pub use batch::{BatchTarget, BatchTaskModel, SaveField};
pub use header_group::{HeaderGroupModel, ProxyModel, ProxyScheme};
pub use template::{CodeLanguage, ExtractRule, ExtractType, HttpMethod, TemplateModel};
pub use workflow::{MAX_SLEEP_SECS, SleepRange, StepModel, WorkflowModel};

/// Validate `text` against `schema` and deserialize it.
fn parse_validated<T: DeserializeOwned>(
    text: &str,
    schema: &Value,
) -> Result<T> {
    let value: Value = serde_json::from_str(text)?;
    jsonschema::validate(schema, &value)?;
    Ok(serde_json::from_value(value)?)
}
