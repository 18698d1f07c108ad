//! Input records and dot-notation field resolution.
//!
//! A record is a JSON object. Paths such as `applicant.income` resolve
//! against either a genuinely nested object (`{"applicant": {"income": 1}}`)
//! or a flat object with dotted keys (`{"applicant.income": 1}`), or any mix
//! of the two. Numeric segments index into arrays (`loans.0.amount`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fingerprint;

/// The data a criteria is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Parse a record from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set a top-level key, returning the record for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Resolve a dot-separated path. `None` means the field is absent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        resolve_in_object(&self.fields, &segments)
    }

    /// Top-level fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical content hash of the record (key order does not matter).
    pub fn fingerprint(&self) -> String {
        fingerprint::record_fingerprint(self)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Longest dotted key wins at each level, so `{"a.b": {"c": 1}}` and
/// `{"a": {"b.c": 1}}` both answer `a.b.c`.
fn resolve_in_object<'a>(object: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    for split in (1..=segments.len()).rev() {
        let key = segments[..split].join(".");
        if let Some(value) = object.get(&key) {
            if split == segments.len() {
                return Some(value);
            }
            if let Some(found) = descend(value, &segments[split..]) {
                return Some(found);
            }
        }
    }
    None
}

fn descend<'a>(value: &'a Value, rest: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(object) => resolve_in_object(object, rest),
        Value::Array(items) => {
            let index: usize = rest[0].parse().ok()?;
            let item = items.get(index)?;
            if rest.len() == 1 {
                Some(item)
            } else {
                descend(item, &rest[1..])
            }
        }
        _ => None,
    }
}
