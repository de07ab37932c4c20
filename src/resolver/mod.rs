//! Reference resolution against a JSON root.
//!
//! A string value is one of:
//! - a path expression starting with `$.` (`$.params.q`, `$.steps.login.extracted.token`),
//!   replaced by the value found at that path,
//! - a `$random(min,max)` call, replaced by a fresh integer draw,
//! - anything else, passed through unchanged.
//!
//! Objects and arrays are resolved leaf by leaf and keep their shape.
//! Resolution never mutates the root and performs no I/O.

pub mod path;
pub mod random;

use serde_json::Value;

use crate::{Result, common::Vars};

pub use path::lookup;

const PATH_PREFIX: &str = "$.";
const RANDOM_PREFIX: &str = "$random(";

/// Resolve one string expression.
pub fn resolve_str(
    root: &Value,
    expr: &str,
) -> Result<Value> {
    let trimmed = expr.trim();
    if trimmed.starts_with(RANDOM_PREFIX) {
        return random::evaluate(trimmed).map(Value::from);
    }
    if trimmed.starts_with(PATH_PREFIX) {
        return path::lookup(root, trimmed).cloned();
    }
    Ok(Value::String(expr.to_string()))
}

/// Resolve every string leaf of `value`.
pub fn resolve_value(
    root: &Value,
    value: &Value,
) -> Result<Value> {
    match value {
        Value::String(s) => resolve_str(root, s),
        Value::Array(arr) => {
            let resolved: Result<Vec<Value>> = arr.iter().map(|v| resolve_value(root, v)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(obj) => {
            let resolved: Result<serde_json::Map<String, Value>> = obj.iter().map(|(k, v)| resolve_value(root, v).map(|rv| (k.clone(), rv))).collect();
            Ok(Value::Object(resolved?))
        }
        _ => Ok(value.clone()),
    }
}

/// Resolve each value of a key → expression map.
pub fn resolve_vars(
    root: &Value,
    vars: &Vars,
) -> Result<Vars> {
    vars.iter().map(|(k, v)| resolve_value(root, v).map(|rv| (k.clone(), rv))).collect()
}
