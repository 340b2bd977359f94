//! Deterministic cache keys
//!
//! A fingerprint is the lowercase hex SHA-256 of the canonical JSON form of
//! `{"params": .., "tool": ..}`. Canonical JSON sorts object keys at every
//! depth and has no insignificant whitespace, so the key depends only on
//! the tool name and the parameter set, never on insertion order or on the
//! process that computed it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Cache key of a step
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a tool invocation
    pub fn of(tool_name: &str, parameters: &Map<String, Value>) -> Self {
        let canonical = format!(
            "{{\"params\":{},\"tool\":{}}}",
            canonical_object(parameters),
            quote(tool_name)
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON serialization of a value
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => canonical_object(map),
    }
}

fn canonical_object(map: &Map<String, Value>) -> String {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let items: Vec<String> = entries
        .into_iter()
        .map(|(k, v)| format!("{}:{}", quote(k), to_canonical_json(v)))
        .collect();
    format!("{{{}}}", items.join(","))
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}
