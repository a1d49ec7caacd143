use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single named descriptor value produced by the feature engine or a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(u64),
    Float(f64),
}

impl FeatureValue {
    /// Numeric view of the value. Booleans map to 0.0 / 1.0.
    pub fn as_f64(&self) -> f64 {
        match self {
            FeatureValue::Float(v) => *v,
            FeatureValue::Int(v) => *v as f64,
            FeatureValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FeatureValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

/// Ordered mapping from feature name to value.
///
/// Backed by a BTreeMap so key order is deterministic across runs, which
/// keeps CSV headers and JSON output stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(flatten)]
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: Into<FeatureValue>>(&mut self, name: &str, value: V) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// Numeric value of a feature, if present.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(FeatureValue::as_f64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.values.iter()
    }

    /// Merge `other` into this record by key union.
    ///
    /// On key collision the value from `other` wins, so plugin-produced
    /// features take precedence over generic engine features.
    pub fn merge(&mut self, other: &FeatureRecord) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }
}

impl FromIterator<(String, FeatureValue)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        FeatureRecord {
            values: iter.into_iter().collect(),
        }
    }
}
