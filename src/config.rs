//! Configuration objects and the local/global precedence rule.
//!
//! Both node parameters and per-query/global settings are [`Parameters`]: a
//! string-keyed JSON object with heterogeneous values. Lookups that may be
//! overridden per query go through [`resolve`], which applies
//! local-over-global-over-default in one place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Keys understood by the pipeline and the engine.
pub mod keys {
    pub const REQUESTED: &str = "requested";
    pub const PASSAGE_QUERY: &str = "passageQuery";
    pub const EXTENT_QUERY: &str = "extentQuery";
    pub const WRAP_PASSAGE_LENGTHS: &str = "wrapPassageLengths";
    pub const WRAP_PASSAGE_EXTENTS: &str = "wrapPassageExtents";
    pub const PASSAGE_SIZE: &str = "passageSize";
    pub const PASSAGE_SHIFT: &str = "passageShift";
    pub const PASSAGE_FIELD: &str = "passageField";
    pub const EARLY_TERMINATION: &str = "earlyTermination";
    pub const DELTA_SCORING: &str = "deltaScoring";
    pub const SCORER: &str = "scorer";
}

pub const DEFAULT_REQUESTED: usize = 1000;
pub const DEFAULT_PASSAGE_SIZE: usize = 100;
pub const DEFAULT_PASSAGE_SHIFT: usize = 50;
pub const DEFAULT_FIELD: &str = "document";
pub const DEFAULT_SCORER: &str = "dirichlet";

/// A string-keyed configuration object with heterogeneous values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse a JSON object.
    pub fn parse_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Builder-style setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// These parameters with `backoff` filling every key they do not set.
    pub fn over(&self, backoff: &Parameters) -> Parameters {
        let mut merged = backoff.clone();
        merged.0.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Typed lookup; a value of the wrong type reads as absent.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(T::from_value)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_as(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get_as(key).unwrap_or(default)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.get_as(key).unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// Conversion from a JSON value for typed parameter lookups.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            // "true"/"false" strings show up in hand-written query files
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Local setting wins if present, else global, else `default`.
pub fn resolve<T: FromValue>(local: &Parameters, global: &Parameters, key: &str, default: T) -> T {
    local
        .get_as(key)
        .or_else(|| global.get_as(key))
        .unwrap_or(default)
}

/// Like [`resolve`] for a flag spelled by several alias keys. Within a level
/// the aliases present are OR-ed; a level with none of them falls through to
/// the next.
pub fn resolve_any(local: &Parameters, global: &Parameters, aliases: &[&str], default: bool) -> bool {
    let level = |params: &Parameters| {
        aliases
            .iter()
            .filter_map(|key| params.get_as::<bool>(key))
            .reduce(|a, b| a || b)
    };
    level(local).or_else(|| level(global)).unwrap_or(default)
}
