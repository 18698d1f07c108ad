//! JSON Schema validation for criteria documents.
//!
//! Documents are checked against `schema/criteria.schema.json` before typed
//! deserialization, so structural mistakes (unknown keys, wrong types) are
//! reported with their JSON pointer instead of a bare serde message.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded criteria schema (loaded at compile time).
const CRITERIA_SCHEMA_JSON: &str = include_str!("../../../../schema/criteria.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(CRITERIA_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a criteria document.
///
/// Returns every violation, formatted as `"<message> at <pointer>"`.
pub fn validate_criteria_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
