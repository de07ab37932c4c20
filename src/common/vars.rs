//! JSON object wrapper used for parameters and extracted values.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// An ordered string-keyed map of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store any serializable value under `key`. Values that fail to serialize are stored as null.
    pub fn set<T: Serialize>(
        &mut self,
        key: &str,
        value: T,
    ) {
        self.inner.insert(key.to_string(), serde_json::to_value(value).unwrap_or(Value::Null));
    }

    /// Read `key` as `T`, `None` when absent or of another shape.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.inner
    }
}

impl std::ops::Deref for Vars {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::ops::DerefMut for Vars {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(inner: Map<String, Value>) -> Self {
        Self {
            inner,
        }
    }
}

/// Non-object values become an empty map.
impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            _ => Self::new(),
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

impl FromIterator<(String, Value)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Vars;

    #[test]
    fn test_set_and_get() {
        let mut vars = Vars::new();
        vars.set("count", 42);
        vars.set("name", "alice");
        assert_eq!(vars.get::<i64>("count"), Some(42));
        assert_eq!(vars.get::<String>("name"), Some("alice".to_string()));
        assert_eq!(vars.get::<String>("count"), None);
        assert_eq!(vars.get::<String>("missing"), None);
    }

    #[test]
    fn test_from_value() {
        let vars = Vars::from(json!({"a": 1}));
        assert_eq!(vars.len(), 1);
        assert!(Vars::from(json!([1, 2])).is_empty());
        assert_eq!(serde_json::Value::from(vars), json!({"a": 1}));
    }
}
