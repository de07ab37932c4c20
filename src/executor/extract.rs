use std::time::Duration;

use serde_json::Value;

use crate::{Result, ScrapeError, executor::Sandbox, model::ExtractRule, resolver};

/// Parse a response body as JSON, falling back to the raw text.
pub(crate) fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// Apply `rule` to the parsed response `body`.
pub(crate) async fn apply(
    rule: &ExtractRule,
    body: &Value,
    sandbox: &dyn Sandbox,
    timeout: Duration,
) -> Result<Value> {
    match rule {
        ExtractRule::Whole => Ok(body.clone()),
        ExtractRule::JsonPath(path) => match resolver::lookup(body, path) {
            Ok(Value::Null) | Err(_) => Err(ScrapeError::ExtractionEmpty(path.clone())),
            Ok(value) => Ok(value.clone()),
        },
        ExtractRule::Code {
            language,
            code,
        } => sandbox.run(*language, code, body.clone(), timeout).await,
    }
}
