//! API key list configuration.
//!
//! Keys may be written either as a single comma-separated string or as a
//! YAML list. Both forms normalise to an ordered list with blank entries
//! dropped.

use serde::{Deserialize, Serialize};

/// One or more API keys, as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyList {
    /// `api_key: "k1, k2"`
    Csv(String),
    /// `api_key: [k1, k2]`
    List(Vec<String>),
}

impl Default for KeyList {
    fn default() -> Self {
        KeyList::List(Vec::new())
    }
}

impl KeyList {
    /// Normalised keys: trimmed, blank entries removed, order preserved
    pub fn keys(&self) -> Vec<String> {
        match self {
            KeyList::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            KeyList::List(items) => items
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

impl From<&str> for KeyList {
    fn from(raw: &str) -> Self {
        KeyList::Csv(raw.to_string())
    }
}

impl From<Vec<String>> for KeyList {
    fn from(items: Vec<String>) -> Self {
        KeyList::List(items)
    }
}
