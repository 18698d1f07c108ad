//! Criteria definitions.
//!
//! Criteria are plain data, authored in YAML or JSON and validated against a
//! JSON Schema before deserialization. [`Criteria::compile`] turns a
//! definition into the immutable [`CompiledCriteria`] the engine evaluates.

mod compile;
mod parser;
mod schema;

pub use compile::{CompiledCriteria, CompiledGroup, CompiledRule, IMPLICIT_GROUP_ID};
pub use parser::{Criteria, CriteriaError, Dependency, Rule, RuleGroup};
pub use schema::validate_criteria_schema;
