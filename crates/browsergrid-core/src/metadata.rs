//! Opaque metadata payloads.
//!
//! Sessions carry caller-supplied configuration (`user_metadata`,
//! `model_config`) and event detail maps that the control plane passes
//! through without interpreting. A closed variant set keeps the boundary
//! typed while staying agnostic to the contents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A key-value bag of pass-through metadata.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Absent/null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Numeric value (JSON number).
    Number(f64),
    /// String.
    String(String),
    /// Ordered list of values.
    Array(Vec<MetadataValue>),
    /// Nested map.
    Object(MetadataMap),
}

impl MetadataValue {
    /// Returns the string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

/// Builds a detail map from key-value pairs.
pub fn detail<I, K, V>(entries: I) -> MetadataMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<MetadataValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
