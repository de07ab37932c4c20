use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{executor::ExecutorResult, model::SaveField, resolver, utils};

/// `<output_name>.json` when the row names its artifact, `<task>_<stamp>_<seq>.json` otherwise.
pub(crate) fn file_name(
    output_name: Option<&str>,
    task_name: &str,
    stamp: &str,
    seq_no: usize,
) -> String {
    match output_name {
        Some(name) => format!("{}.json", utils::sanitize_filename(name)),
        None => format!("{}_{}_{}.json", utils::sanitize_filename(task_name), stamp, seq_no),
    }
}

/// Artifact content of one item.
///
/// With `data_json_path` the artifact is the value at that path in `data`, or
/// in `raw_response` when `data` is not an object or array; a miss is `null`.
/// Without it the artifact holds the selected fields of the result.
pub(crate) fn content(
    result: &ExecutorResult,
    save_fields: &[SaveField],
    data_json_path: Option<&str>,
) -> Value {
    if let Some(path) = data_json_path {
        let base = match &result.data {
            Value::Object(_) | Value::Array(_) => &result.data,
            _ => &result.raw_response,
        };
        return resolver::lookup(base, path).cloned().unwrap_or(Value::Null);
    }

    let fields = if save_fields.is_empty() {
        SaveField::all()
    } else {
        save_fields.to_vec()
    };
    let mut payload = Map::new();
    for field in fields {
        let value = match field {
            SaveField::Success => Value::Bool(result.success),
            SaveField::Error => result.error.as_ref().map(|e| Value::String(e.to_string())).unwrap_or(Value::Null),
            SaveField::Data => result.data.clone(),
            SaveField::RawResponse => result.raw_response.clone(),
            SaveField::Request => result.request.clone(),
        };
        payload.insert(field.as_ref().to_string(), value);
    }
    Value::Object(payload)
}

/// A relative `output_dir` is placed under `output_root` unless it already starts with it.
/// An empty one becomes `output_root/<task name>`.
pub(crate) fn output_dir(
    output_root: &Path,
    output_dir: &str,
    task_name: &str,
) -> PathBuf {
    let dir = output_dir.trim();
    if dir.is_empty() {
        return output_root.join(utils::sanitize_filename(task_name));
    }
    let dir = Path::new(dir);
    if dir.is_absolute() || dir.starts_with(output_root) {
        dir.to_path_buf()
    } else {
        output_root.join(dir)
    }
}
