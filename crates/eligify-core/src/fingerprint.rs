//! Content fingerprints for criteria and records.
//!
//! Both are SHA-256 over a canonical JSON rendering with object keys sorted
//! at every level, hex-encoded. Criteria fingerprints cover only what affects
//! a verdict (fields, operators, values, weights, logic, thresholds); names
//! and descriptions are left out.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::comparator::Condition;
use crate::criteria::{CompiledCriteria, CompiledGroup, CompiledRule};
use crate::record::Record;

/// Fingerprint of a compiled criteria.
pub fn criteria_fingerprint(criteria: &CompiledCriteria) -> String {
    let thresholds: Vec<Value> = criteria
        .thresholds()
        .iter()
        .map(|t| json!({ "min_score": t.min_score, "label": t.label }))
        .collect();

    let document = json!({
        "id": criteria.id(),
        "active": criteria.is_active(),
        "pass_threshold": criteria.pass_threshold(),
        "scoring_method": criteria.scoring_method().as_str(),
        "group_logic": criteria.group_logic().to_string(),
        "decision_thresholds": thresholds,
        "default_decision": criteria.default_decision(),
        "rules": criteria.rules().iter().map(rule_document).collect::<Vec<_>>(),
        "groups": criteria.groups().iter().map(group_document).collect::<Vec<_>>(),
    });

    digest(&canonical_json(&document))
}

/// Fingerprint of a record; independent of key order.
pub fn record_fingerprint(record: &Record) -> String {
    let document = Value::Object(record.fields().clone());
    digest(&canonical_json(&document))
}

fn condition_document(condition: &Condition) -> Value {
    json!({
        "field": condition.field(),
        "operator": condition.operator().symbol(),
        "value": condition.expected(),
    })
}

fn rule_document(rule: &CompiledRule) -> Value {
    json!({
        "id": rule.id,
        "condition": condition_document(&rule.condition),
        "weight": rule.weight,
        "depends_on": rule.dependency.as_ref().map(condition_document),
    })
}

fn group_document(group: &CompiledGroup) -> Value {
    json!({
        "id": group.id,
        "logic": group.logic.to_string(),
        "weight": group.weight,
        "rules": group.rules.iter().map(rule_document).collect::<Vec<_>>(),
        "groups": group.groups.iter().map(group_document).collect::<Vec<_>>(),
    })
}

/// Serialize with object keys sorted, independent of `serde_json` map order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn digest(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
