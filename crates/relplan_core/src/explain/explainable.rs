use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Description of a single plan node for EXPLAIN output.
///
/// Items are keyed by name and kept sorted so output is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainEntry {
    pub name: String,
    pub items: BTreeMap<String, ExplainValue>,
}

impl ExplainEntry {
    pub fn new(name: impl Into<String>) -> Self {
        ExplainEntry {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn with_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.with_item(key, ExplainValue::Value(value.to_string()))
    }

    pub fn with_values<V: fmt::Display>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.with_item(key, ExplainValue::Values(values))
    }

    /// Add symbol to expression style pairs, eg. projection assignments.
    pub fn with_map<K: fmt::Display, V: fmt::Display>(
        self,
        key: impl Into<String>,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.with_item(key, ExplainValue::Map(pairs))
    }

    fn with_item(mut self, key: impl Into<String>, value: ExplainValue) -> Self {
        self.items.insert(key.into(), value);
        self
    }
}

impl fmt::Display for ExplainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        let mut sep = " (";
        for (key, value) in &self.items {
            write!(f, "{sep}{key} = {value}")?;
            sep = ", ";
        }
        if !self.items.is_empty() {
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplainValue {
    Value(String),
    Values(Vec<String>),
    Map(Vec<(String, String)>),
}

impl fmt::Display for ExplainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.write_str(v),
            Self::Values(vs) => write!(f, "[{}]", vs.join(", ")),
            Self::Map(pairs) => {
                f.write_str("{")?;
                for (idx, (k, v)) in pairs.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainConfig {
    /// Include node ids and output symbol types.
    pub verbose: bool,
}

pub trait Explainable {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry;
}
