use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Result, ScrapeError};

/// Shared headers (session cookies, auth tokens) attachable to templates.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HeaderGroupModel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub proxy_ref: Option<String>,
}

impl HeaderGroupModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let group: Self = super::parse_validated(s, &Self::schema())?;
        Ok(group.normalize())
    }

    pub fn normalize(mut self) -> Self {
        if self.id.is_empty() {
            self.id = self.name.clone();
        }
        self
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string", "minLength": 1 },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "proxy_ref": { "type": ["string", "null"] }
            }
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks5,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProxyModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scheme: ProxyScheme,
    #[serde(alias = "ip")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ProxyModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let proxy: Self = super::parse_validated(s, &Self::schema())?;
        proxy.normalize()
    }

    pub fn normalize(mut self) -> Result<Self> {
        if self.host.trim().is_empty() {
            return Err(ScrapeError::ConfigurationError("proxy host is required".to_string()));
        }
        if self.name.is_empty() {
            self.name = format!("{}:{}", self.host, self.port);
        }
        if self.id.is_empty() {
            self.id = self.name.clone();
        }
        Ok(self)
    }

    /// `scheme://host:port`
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_ref(), self.host, self.port)
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["port"],
            "anyOf": [
                { "required": ["host"] },
                { "required": ["ip"] }
            ],
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string" },
                "scheme": { "type": "string", "enum": ["http", "https", "socks5"] },
                "host": { "type": "string" },
                "ip": { "type": "string" },
                "port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                "enabled": { "type": "boolean" }
            }
        })
    }
}
