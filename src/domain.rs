use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OniError;

pub const TABLES_KEY: &str = "tables";

/// Secret used to authenticate against a provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for an empty or all-whitespace key.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return None;
        }
        Some(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// The tabulator configuration as a JSON object. Key order is kept as read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Map<String, Value>);

impl ConfigDocument {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Result<Self, OniError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(OniError::Configuration(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Table identifiers in document order. `"tables"` may be a list of
    /// names or an object keyed by name.
    pub fn tables(&self) -> Vec<String> {
        match self.0.get(TABLES_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(|value| value.to_string()))
                .collect(),
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Checks the shape a tabulator needs before it can load the document.
    pub fn validate(&self) -> Result<(), OniError> {
        match self.0.get(TABLES_KEY) {
            None => Err(OniError::Configuration(format!(
                "missing \"{TABLES_KEY}\" entry"
            ))),
            Some(Value::Array(items)) => {
                if let Some(bad) = items.iter().find(|item| !item.is_string()) {
                    return Err(OniError::Configuration(format!(
                        "table identifiers must be strings, found {}",
                        json_kind(bad)
                    )));
                }
                Ok(())
            }
            Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(OniError::Configuration(format!(
                "\"{TABLES_KEY}\" must be a list or an object, found {}",
                json_kind(other)
            ))),
        }
    }

    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromStr for ConfigDocument {
    type Err = OniError;

    /// Blank input parses to an empty document.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self::new());
        }
        let parsed: Value = serde_json::from_str(value)
            .map_err(|err| OniError::Configuration(err.to_string()))?;
        Self::from_value(parsed)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
