//! Free-form values found under `parameters` and template `vars`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A user-supplied value of arbitrary shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ParameterValue>),
    Map(IndexMap<String, ParameterValue>),
}

impl ParameterValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParameterValue::Null)
    }

    fn is_scalar(&self) -> bool {
        !matches!(self, ParameterValue::List(_) | ParameterValue::Map(_))
    }

    /// Render the value for use as an environment variable.
    ///
    /// Scalars print as themselves, lists of scalars are comma-joined, and
    /// anything nested is encoded as JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            ParameterValue::Null => String::new(),
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Integer(i) => i.to_string(),
            ParameterValue::Float(f) => f.to_string(),
            ParameterValue::String(s) => s.clone(),
            ParameterValue::List(items) if items.iter().all(ParameterValue::is_scalar) => items
                .iter()
                .map(ParameterValue::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            nested => serde_json::to_string(nested).unwrap_or_default(),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::String(s.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        ParameterValue::String(s)
    }
}

impl From<bool> for ParameterValue {
    fn from(b: bool) -> Self {
        ParameterValue::Bool(b)
    }
}

impl From<i64> for ParameterValue {
    fn from(i: i64) -> Self {
        ParameterValue::Integer(i)
    }
}
