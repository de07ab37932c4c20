use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Result, ScrapeError, common::Vars};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

/// How the parsed response body is turned into a result value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractType {
    #[default]
    #[serde(alias = "jsonpath")]
    JsonPath,
    #[serde(alias = "python")]
    PythonCode,
    #[serde(alias = "javascript")]
    JavascriptCode,
    Raw,
}

/// Code language of a parser snippet
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CodeLanguage {
    Python3,
    Javascript,
}

/// The extraction step of a template, decided once from its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractRule {
    /// no path or code configured: the parsed body is the result
    Whole,
    JsonPath(String),
    Code {
        language: CodeLanguage,
        code: String,
    },
}

/// A declarative single-request definition.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TemplateModel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// query (GET) or query/form parameters, string leaves may be path expressions
    #[serde(default)]
    pub default_params: Vars,
    /// JSON structure, raw string, or nothing
    #[serde(default)]
    pub body_template: Option<Value>,
    #[serde(default)]
    pub extract_type: ExtractType,
    #[serde(default)]
    pub json_path: Option<String>,
    #[serde(default)]
    pub parser_code: Option<String>,
    #[serde(default)]
    pub header_group_ref: Option<String>,
    /// request timeout in milliseconds, the engine default applies when unset
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TemplateModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let template: Self = super::parse_validated(s, &Self::schema())?;
        template.normalize()
    }

    /// Fill the id from the name and reject unusable definitions.
    pub fn normalize(mut self) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(ScrapeError::ConfigurationError("template name is required".to_string()));
        }
        if self.id.is_empty() {
            self.id = self.name.clone();
        }
        if self.url.trim().is_empty() {
            return Err(ScrapeError::ConfigurationError(format!("template '{}' has an empty url", self.name)));
        }
        Ok(self)
    }

    pub fn extract_rule(&self) -> ExtractRule {
        let non_empty = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        match self.extract_type {
            ExtractType::JsonPath => non_empty(&self.json_path).map(ExtractRule::JsonPath).unwrap_or(ExtractRule::Whole),
            ExtractType::PythonCode => non_empty(&self.parser_code)
                .map(|code| ExtractRule::Code {
                    language: CodeLanguage::Python3,
                    code,
                })
                .unwrap_or(ExtractRule::Whole),
            ExtractType::JavascriptCode => non_empty(&self.parser_code)
                .map(|code| ExtractRule::Code {
                    language: CodeLanguage::Javascript,
                    code,
                })
                .unwrap_or(ExtractRule::Whole),
            ExtractType::Raw => ExtractRule::Whole,
        }
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "url"],
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string", "minLength": 1 },
                "description": { "type": "string" },
                "url": { "type": "string", "minLength": 1 },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "default_params": { "type": "object" },
                "body_template": {
                    "description": "JSON body or raw string, string leaves may reference $.params.*"
                },
                "extract_type": {
                    "type": "string",
                    "enum": ["json_path", "jsonpath", "python_code", "python", "javascript_code", "javascript", "raw"]
                },
                "json_path": { "type": ["string", "null"] },
                "parser_code": { "type": ["string", "null"] },
                "header_group_ref": { "type": ["string", "null"] },
                "timeout_ms": { "type": ["integer", "null"], "minimum": 0 }
            }
        })
    }
}
