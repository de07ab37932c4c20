use serde_json::Value;

use crate::{Result, common::Vars};

/// Column naming the artifact of a row, never passed as a parameter.
pub(crate) const OUTPUT_NAME_COLUMN: &str = "output_name";

/// One parameter row of a batch task.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Row {
    pub params: Vars,
    pub output_name: Option<String>,
}

/// Parse CSV text with a header row into rows, in order.
///
/// Values are trimmed, values starting with `{` or `[` that parse as JSON
/// become JSON values. Empty text gives no rows.
pub(crate) fn parse(csv_text: &str) -> Result<Vec<Row>> {
    let text = csv_text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut params = Vars::new();
        let mut output_name = None;
        for (key, raw) in headers.iter().zip(record.iter()) {
            if key == OUTPUT_NAME_COLUMN {
                output_name = Some(raw.to_string()).filter(|s| !s.is_empty());
                continue;
            }
            params.insert(key.to_string(), cell(raw));
        }
        rows.push(Row {
            params,
            output_name,
        });
    }
    Ok(rows)
}

fn cell(raw: &str) -> Value {
    if raw.starts_with('{') || raw.starts_with('[') {
        if let Ok(value) = serde_json::from_str(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_rows_in_order() {
        let rows = parse("code, name\n600000 , bank\n000001,  ping an\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].params, Vars::from(json!({"code": "600000", "name": "bank"})));
        assert_eq!(rows[1].params, Vars::from(json!({"code": "000001", "name": "ping an"})));
    }

    #[test]
    fn test_json_cells_are_parsed() {
        let rows = parse("q,filter\na,\"{\"\"pe\"\": 10}\"\nb,\"[1, 2]\"\nc,{not json").unwrap();
        assert_eq!(rows[0].params.get::<Value>("filter"), Some(json!({"pe": 10})));
        assert_eq!(rows[1].params.get::<Value>("filter"), Some(json!([1, 2])));
        assert_eq!(rows[2].params.get::<Value>("filter"), Some(json!("{not json")));
    }

    #[test]
    fn test_output_name_column_is_removed() {
        let rows = parse("code,output_name\n1,first\n2,\n").unwrap();
        assert_eq!(rows[0].output_name.as_deref(), Some("first"));
        assert!(!rows[0].params.contains_key(OUTPUT_NAME_COLUMN));
        assert_eq!(rows[1].output_name, None);
    }

    #[test]
    fn test_empty_csv_has_no_rows() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  \n ").unwrap().is_empty());
        assert!(parse("code\n").unwrap().is_empty());
    }
}
