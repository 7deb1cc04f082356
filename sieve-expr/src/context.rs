//! Run-time evaluation context

use crate::error::{ExprError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespaced input values for one evaluation.
///
/// Top-level keys are namespaces (`user`, `request`, ...); expressions address
/// values below them as `namespace:dotted.path`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ExprError::type_mismatch("context", "object", &other)),
        }
    }

    /// Add or replace a namespace (builder form)
    pub fn with(mut self, namespace: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(namespace, value);
        self
    }

    pub fn insert(&mut self, namespace: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(namespace.into(), value.into());
    }

    pub fn namespace(&self, namespace: &str) -> Option<&Value> {
        self.0.get(namespace)
    }

    /// Walk `namespace` then each `.`-separated segment of `path`.
    ///
    /// Array elements are addressed by numeric segments. Returns `None` when
    /// any step is missing.
    pub fn lookup(&self, namespace: &str, path: &str) -> Option<&Value> {
        let mut current = self.0.get(namespace)?;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
