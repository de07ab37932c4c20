//! Request construction from a template and the caller's inputs.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value, json};

use crate::{
    Result, ScrapeError,
    common::Vars,
    executor::http::{HttpRequest, RequestBody},
    model::{HttpMethod, TemplateModel},
    resolver,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Header group headers first, template headers on top.
pub(crate) fn merge_headers(
    group: Option<&HashMap<String, String>>,
    template: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in group.into_iter().flatten().chain(template) {
        // a template header replaces a group header of any case
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(k));
        headers.insert(k.clone(), v.clone());
    }
    headers
}

fn is_form(headers: &BTreeMap<String, String>) -> bool {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .is_some_and(|(_, v)| v.to_ascii_lowercase().contains(FORM_CONTENT_TYPE))
}

/// Build the request for `template` with `inputs` bound to `$.params`.
///
/// `default_params` and `body_template` are resolved first, then every input
/// overrides: a key already present in the params or in a map body replaces it
/// there, any other key goes to the body for non-GET requests (when the body is
/// a map or empty) and to the query otherwise.
pub(crate) fn build(
    template: &TemplateModel,
    headers: BTreeMap<String, String>,
    inputs: &Vars,
) -> Result<HttpRequest> {
    let url = template.url.trim();
    if url.is_empty() {
        return Err(ScrapeError::ConfigurationError(format!("template '{}' has an empty url", template.name)));
    }

    let root = json!({ "params": inputs });
    let url = match resolver::resolve_str(&root, url)? {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let mut params: Map<String, Value> = resolver::resolve_vars(&root, &template.default_params)?.into_inner();
    let form = is_form(&headers);

    let mut body: Option<Value> = match &template.body_template {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if form => Some(Value::Object(
            url::form_urlencoded::parse(s.as_bytes())
                .map(|(k, v)| resolve_leaf(&root, &v).map(|v| (k.into_owned(), Value::String(v))))
                .collect::<Result<Map<String, Value>>>()?,
        )),
        Some(b) => Some(resolver::resolve_value(&root, b)?),
    };

    for (key, value) in inputs.iter() {
        let in_params = params.contains_key(key);
        let in_body = matches!(&body, Some(Value::Object(map)) if map.contains_key(key));
        if in_params {
            params.insert(key.clone(), value.clone());
        }
        if in_body && let Some(Value::Object(map)) = body.as_mut() {
            map.insert(key.clone(), value.clone());
        }
        if in_params || in_body {
            continue;
        }

        let to_body = template.method != HttpMethod::GET && matches!(body, None | Some(Value::Object(_)));
        if !to_body {
            params.insert(key.clone(), value.clone());
        } else if let Value::Object(map) = body.get_or_insert_with(|| Value::Object(Map::new())) {
            map.insert(key.clone(), value.clone());
        }
    }

    let body = match body {
        None => RequestBody::Empty,
        Some(_) if template.method == HttpMethod::GET => RequestBody::Empty,
        Some(Value::String(s)) => RequestBody::Text(s),
        Some(Value::Object(map)) if form => RequestBody::Form(map),
        Some(other) => RequestBody::Json(other),
    };

    Ok(HttpRequest {
        method: template.method,
        url,
        headers,
        params,
        body,
    })
}

/// Resolve one form field decoded from a string body.
fn resolve_leaf(
    root: &Value,
    raw: &str,
) -> Result<String> {
    Ok(match resolver::resolve_str(root, raw)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}
