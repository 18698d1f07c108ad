//! RuleEvaluator: apply one compiled rule to a record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::comparator::Comparison;
use crate::criteria::CompiledRule;
use crate::dependency::SkipSet;
use crate::record::Record;
use crate::result::{OutcomeStatus, RuleOutcome};

/// Evaluates single rules and counts how many it has evaluated.
///
/// The counter covers rules whose condition was actually checked (skipped
/// rules are not counted); callers use it to observe cache hits.
#[derive(Debug, Default)]
pub struct RuleEvaluator {
    invocations: AtomicU64,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rule conditions checked so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn evaluate(&self, rule: &CompiledRule, record: &Record, skip: &SkipSet) -> RuleOutcome {
        let condition = &rule.condition;

        if skip.contains(&rule.id) {
            tracing::trace!(rule = %rule.id, "Skipped, dependency not met");
            return RuleOutcome {
                rule_id: rule.id.clone(),
                field: condition.field().to_string(),
                operator: condition.operator().symbol().to_string(),
                expected: condition.expected().clone(),
                actual: record.get(condition.field()).cloned(),
                passed: true,
                skipped: true,
                status: OutcomeStatus::Skipped,
                weight: rule.weight,
                score: 0.0,
                error: None,
                duration_us: 0,
            };
        }

        let started = Instant::now();
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let (actual, comparison) = condition.check(record);

        let (status, error) = match comparison {
            Comparison::Match => (OutcomeStatus::Passed, None),
            Comparison::Mismatch => (OutcomeStatus::ValueMismatch, None),
            Comparison::FieldMissing => (OutcomeStatus::FieldMissing, None),
            Comparison::Malformed(reason) => {
                tracing::warn!(rule = %rule.id, reason = %reason, "Malformed rule evaluated as failed");
                (OutcomeStatus::Malformed, Some(reason))
            }
        };
        let passed = status == OutcomeStatus::Passed;

        tracing::trace!(rule = %rule.id, ?status, "Evaluated rule");

        RuleOutcome {
            rule_id: rule.id.clone(),
            field: condition.field().to_string(),
            operator: condition.operator().symbol().to_string(),
            expected: condition.expected().clone(),
            actual,
            passed,
            skipped: false,
            status,
            weight: rule.weight,
            score: if passed { rule.weight } else { 0.0 },
            error,
            duration_us: started.elapsed().as_micros() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::Condition;
    use serde_json::{json, Value};

    fn rule(id: &str, field: &str, op: &str, value: Value, weight: f64) -> CompiledRule {
        CompiledRule {
            id: id.to_string(),
            condition: Condition::new(field, op, value).unwrap(),
            weight,
            dependency: None,
            description: None,
        }
    }

    #[test]
    fn test_passing_rule_contributes_weight() {
        let evaluator = RuleEvaluator::new();
        let outcome = evaluator.evaluate(
            &rule("r", "income", ">=", json!(3000), 40.0),
            &Record::new().with("income", 4500),
            &SkipSet::new(),
        );
        assert!(outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert_eq!(outcome.score, 40.0);
        assert_eq!(outcome.actual, Some(json!(4500)));
        assert_eq!(evaluator.invocations(), 1);
    }

    #[test]
    fn test_missing_field_is_distinguished_from_mismatch() {
        let evaluator = RuleEvaluator::new();
        let r = rule("r", "income", ">=", json!(3000), 40.0);

        let missing = evaluator.evaluate(&r, &Record::new(), &SkipSet::new());
        assert_eq!(missing.status, OutcomeStatus::FieldMissing);
        assert_eq!(missing.actual, None);
        assert_eq!(missing.score, 0.0);

        let low = evaluator.evaluate(&r, &Record::new().with("income", 100), &SkipSet::new());
        assert_eq!(low.status, OutcomeStatus::ValueMismatch);
        assert!(low.is_failure());
    }

    #[test]
    fn test_malformed_between_fails_with_error() {
        let evaluator = RuleEvaluator::new();
        let outcome = evaluator.evaluate(
            &rule("r", "age", "between", json!([18]), 1.0),
            &Record::new().with("age", 30),
            &SkipSet::new(),
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::Malformed);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_skipped_rule_is_neutral() {
        let evaluator = RuleEvaluator::new();
        let skip: SkipSet = ["r".to_string()].into_iter().collect();
        let outcome = evaluator.evaluate(
            &rule("r", "income", ">=", json!(3000), 40.0),
            &Record::new().with("income", 1),
            &skip,
        );
        assert!(outcome.passed);
        assert!(outcome.skipped);
        assert_eq!(outcome.score, 0.0);
        assert!(!outcome.is_failure());
        assert_eq!(evaluator.invocations(), 0);
    }
}
