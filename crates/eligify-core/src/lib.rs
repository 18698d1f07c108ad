//! # eligify-core
//!
//! Deterministic eligibility evaluation engine.
//!
//! Given a declarative [`Criteria`] (weighted rules, nested rule groups,
//! dependencies, decision bands) and an input [`Record`], the engine answers:
//! - Is the subject eligible?
//! - What score and decision label does it get?
//! - Which rules failed, and why?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same criteria and record always produce the same result
//!    (apart from timestamp and durations)
//! 2. **Pure**: no I/O, no callbacks; side effects belong to the caller
//! 3. **Traceable**: every rule outcome is logged with its actual value and status
//! 4. **Load-time validation**: unknown operators, malformed values and cyclic
//!    groups are rejected before any record is evaluated
//!
//! ## Example
//!
//! ```rust,ignore
//! use eligify_core::{Criteria, Engine, Record};
//!
//! let criteria = Criteria::from_yaml_file("loan.yaml")?.compile()?;
//! let record = Record::from_json(r#"{"income": 5000, "credit_score": 780}"#)?;
//! let result = Engine::new().evaluate(&criteria, &record)?;
//!
//! println!("{}", result.summary());
//! ```

pub mod batch;
pub mod comparator;
pub mod criteria;
pub mod decision;
pub mod dependency;
pub mod engine;
pub mod fingerprint;
pub mod group;
pub mod operator;
pub mod record;
pub mod result;
pub mod rule;
pub mod scoring;

// Re-export main types at crate root
pub use batch::BatchResult;
pub use comparator::{Comparison, Condition, ConditionError, ValueComparator};
pub use criteria::{
    validate_criteria_schema, CompiledCriteria, CompiledGroup, CompiledRule, Criteria,
    CriteriaError, Dependency, Rule, RuleGroup, IMPLICIT_GROUP_ID,
};
pub use decision::{DecisionResolver, DecisionThreshold, DEFAULT_DECISION};
pub use dependency::{DependencyResolver, SkipSet};
pub use engine::{Engine, EngineOptions};
pub use group::{CombinationLogic, GroupEvaluator};
pub use operator::{Operator, UnknownOperator};
pub use record::Record;
pub use result::{EvaluationResult, FailedRule, GroupOutcome, OutcomeStatus, RuleOutcome};
pub use rule::RuleEvaluator;
pub use scoring::{ScoreUnit, ScoringEngine, ScoringMethod};

use thiserror::Error;

/// Errors that can occur during evaluation
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Criteria error: {0}")]
    Criteria(#[from] CriteriaError),

    #[error("Invalid record: expected a JSON object")]
    InvalidRecord,

    #[error("Criteria '{0}' is inactive")]
    Inactive(String),

    #[error("Failed to start batch workers: {0}")]
    WorkerPool(String),
}

/// Compile `criteria` and evaluate a single record with default options.
///
/// Convenient for one-off checks; callers evaluating many records should
/// compile once and reuse an [`Engine`].
pub fn evaluate(criteria: &Criteria, record: &Record) -> Result<EvaluationResult, EvaluationError> {
    let compiled = criteria.compile()?;
    Engine::new().evaluate(&compiled, record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOAN_YAML: &str = r#"
id: loan
name: Loan Approval
pass_threshold: 80
scoring_method: weighted
decision_thresholds:
  - { min_score: 90, label: approved }
  - { min_score: 60, label: review }
  - { min_score: 0, label: rejected }
rules:
  - { field: applicant.income, operator: gte, value: 3000, weight: 40 }
  - { field: applicant.credit_score, operator: ">=", value: 650, weight: 40 }
  - { field: applicant.active_loans, operator: "<=", value: 2, weight: 20 }
"#;

    #[test]
    fn test_evaluate_from_yaml() {
        let criteria = Criteria::from_yaml(LOAN_YAML).unwrap();
        let record = Record::from_json(
            r#"{"applicant": {"income": 5000, "credit_score": 780, "active_loans": 3}}"#,
        )
        .unwrap();

        let result = evaluate(&criteria, &record).unwrap();
        assert_eq!(result.criteria_id, "loan");
        assert_eq!(result.score, 80.0);
        assert!(result.passed);
        assert_eq!(result.decision, "review");
        assert_eq!(result.failed_rules.len(), 1);
        assert_eq!(result.failed_rules[0].field, "applicant.active_loans");
    }

    #[test]
    fn test_configuration_error_surfaces_before_evaluation() {
        let mut criteria = Criteria::from_yaml(LOAN_YAML).unwrap();
        criteria.rules[0].operator = "approximately".into();
        let result = evaluate(&criteria, &Record::new());
        assert!(matches!(result, Err(EvaluationError::Criteria(_))));
    }

    #[test]
    fn test_result_serializes_wire_fields() {
        let criteria = Criteria::from_yaml(LOAN_YAML).unwrap();
        let record = Record::from_json(r#"{"applicant": {"income": 100}}"#).unwrap();
        let result = evaluate(&criteria, &record).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        for key in ["passed", "score", "decision", "failed_rules", "execution_log"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        let first = &json["execution_log"][0];
        for key in ["field", "operator", "expected", "actual", "passed", "weight", "score"] {
            assert!(first.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["failed_rules"][1]["actual"], serde_json::Value::Null);
    }
}
