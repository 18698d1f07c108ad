//! GroupEvaluator: combine rules and nested groups under a boolean logic.
//!
//! Given `n` = non-skipped rules plus subgroups and `p` = how many of them passed:
//!
//! | Logic | Passes when |
//! |-------|-------------|
//! | `all` / `and` / `boolean` | `p == n` (vacuously true for `n == 0`) |
//! | `any` / `or` | `p >= 1` |
//! | `majority` | `p > n / 2` |
//! | `min_required: k` | `p >= k` |
//! | `nand` | `!(p == n)` |
//! | `nor` | `p == 0` |
//! | `xor` | `p == 1` |
//!
//! A nested group contributes a single pass/fail to its parent; its internal
//! weights do not propagate upward.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::criteria::CompiledGroup;
use crate::dependency::SkipSet;
use crate::record::Record;
use crate::result::GroupOutcome;
use crate::rule::RuleEvaluator;

/// How the members of a group combine into one verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationLogic {
    #[default]
    #[serde(alias = "and", alias = "boolean")]
    All,
    #[serde(alias = "or")]
    Any,
    Majority,
    MinRequired(usize),
    Nand,
    Nor,
    Xor,
}

impl CombinationLogic {
    /// Apply the logic to `passed` out of `considered` members.
    pub fn passes(self, passed: usize, considered: usize) -> bool {
        match self {
            CombinationLogic::All => passed == considered,
            CombinationLogic::Any => passed >= 1,
            CombinationLogic::Majority => passed * 2 > considered,
            CombinationLogic::MinRequired(k) => passed >= k,
            CombinationLogic::Nand => passed != considered,
            CombinationLogic::Nor => passed == 0,
            CombinationLogic::Xor => passed == 1,
        }
    }
}

impl fmt::Display for CombinationLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombinationLogic::All => f.write_str("all"),
            CombinationLogic::Any => f.write_str("any"),
            CombinationLogic::Majority => f.write_str("majority"),
            CombinationLogic::MinRequired(k) => write!(f, "min_required({})", k),
            CombinationLogic::Nand => f.write_str("nand"),
            CombinationLogic::Nor => f.write_str("nor"),
            CombinationLogic::Xor => f.write_str("xor"),
        }
    }
}

/// `100 * passed / considered`, or 100 when nothing was considered.
pub fn group_score(passed: usize, considered: usize) -> f64 {
    if considered == 0 {
        100.0
    } else {
        let raw = 100.0 * passed as f64 / considered as f64;
        (raw * 100.0).round() / 100.0
    }
}

/// Recursive evaluator for rule groups.
pub struct GroupEvaluator<'a> {
    rules: &'a RuleEvaluator,
}

impl<'a> GroupEvaluator<'a> {
    pub fn new(rules: &'a RuleEvaluator) -> Self {
        Self { rules }
    }

    /// Evaluate `group` and all of its descendants against `record`.
    pub fn evaluate(&self, group: &CompiledGroup, record: &Record, skip: &SkipSet) -> GroupOutcome {
        let started = Instant::now();

        let rules: Vec<_> = group
            .rules
            .iter()
            .map(|rule| self.rules.evaluate(rule, record, skip))
            .collect();

        let groups: Vec<GroupOutcome> = group
            .groups
            .iter()
            .map(|child| self.evaluate(child, record, skip))
            .collect();

        let considered_rules = rules.iter().filter(|r| !r.skipped);
        let considered = considered_rules.clone().count() + groups.len();
        let passed_count =
            considered_rules.filter(|r| r.passed).count() + groups.iter().filter(|g| g.passed).count();

        let passed = group.logic.passes(passed_count, considered);

        tracing::debug!(
            group = %group.id,
            logic = %group.logic,
            considered,
            passed_count,
            passed,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Evaluated group"
        );

        GroupOutcome {
            group_id: group.id.clone(),
            name: group.name.clone(),
            logic: group.logic.to_string(),
            weight: group.weight,
            passed,
            score: group_score(passed_count, considered),
            considered,
            passed_count,
            rules,
            groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criteria, Rule, RuleGroup};
    use serde_json::json;

    fn truth_table(logic: CombinationLogic) -> [bool; 4] {
        // Rows: (F,F) (F,T) (T,F) (T,T)
        [
            logic.passes(0, 2),
            logic.passes(1, 2),
            logic.passes(1, 2),
            logic.passes(2, 2),
        ]
    }

    #[test]
    fn test_two_input_truth_tables() {
        assert_eq!(truth_table(CombinationLogic::All), [false, false, false, true]);
        assert_eq!(truth_table(CombinationLogic::Any), [false, true, true, true]);
        assert_eq!(truth_table(CombinationLogic::Xor), [false, true, true, false]);
        assert_eq!(truth_table(CombinationLogic::Nand), [true, true, true, false]);
        assert_eq!(truth_table(CombinationLogic::Nor), [true, false, false, false]);
    }

    #[test]
    fn test_empty_group_semantics() {
        assert!(CombinationLogic::All.passes(0, 0));
        assert!(!CombinationLogic::Any.passes(0, 0));
        assert!(!CombinationLogic::Majority.passes(0, 0));
        assert!(CombinationLogic::MinRequired(0).passes(0, 0));
        assert_eq!(group_score(0, 0), 100.0);
    }

    #[test]
    fn test_majority_and_min_required() {
        assert!(CombinationLogic::Majority.passes(2, 3));
        assert!(!CombinationLogic::Majority.passes(2, 4));
        assert!(CombinationLogic::MinRequired(2).passes(2, 5));
        assert!(!CombinationLogic::MinRequired(3).passes(2, 5));
    }

    #[test]
    fn test_logic_serde_forms() {
        let all: CombinationLogic = serde_json::from_value(json!("and")).unwrap();
        assert_eq!(all, CombinationLogic::All);
        let any: CombinationLogic = serde_json::from_value(json!("or")).unwrap();
        assert_eq!(any, CombinationLogic::Any);
        let k: CombinationLogic = serde_json::from_value(json!({"min_required": 2})).unwrap();
        assert_eq!(k, CombinationLogic::MinRequired(2));
        assert_eq!(k.to_string(), "min_required(2)");
    }

    #[test]
    fn test_nested_group_counts_as_one_member() {
        let compiled = Criteria::new("nested")
            .group(
                RuleGroup::new("Outer", CombinationLogic::All)
                    .with_id("outer")
                    .rule(Rule::new("a", "==", 1))
                    .subgroup("inner"),
            )
            .group(
                RuleGroup::new("Inner", CombinationLogic::Any)
                    .with_id("inner")
                    .rule(Rule::new("b", "==", 1).with_weight(100.0))
                    .rule(Rule::new("c", "==", 1)),
            )
            .compile()
            .unwrap();

        let rules = RuleEvaluator::new();
        let evaluator = GroupEvaluator::new(&rules);
        let record = Record::new().with("a", 1).with("b", 0).with("c", 1);

        let outcome = evaluator.evaluate(&compiled.groups()[0], &record, &SkipSet::new());
        assert!(outcome.passed);
        assert_eq!(outcome.considered, 2);
        assert_eq!(outcome.passed_count, 2);
        assert_eq!(outcome.groups[0].considered, 2);
        assert_eq!(outcome.groups[0].passed_count, 1);
        assert_eq!(outcome.groups[0].score, 50.0);
    }

    #[test]
    fn test_skipped_rules_are_not_counted() {
        let compiled = Criteria::new("skips")
            .group(
                RuleGroup::new("G", CombinationLogic::Xor)
                    .rule(Rule::new("a", "==", 1).with_id("a"))
                    .rule(Rule::new("b", "==", 1).with_id("b")),
            )
            .compile()
            .unwrap();

        let rules = RuleEvaluator::new();
        let evaluator = GroupEvaluator::new(&rules);
        let record = Record::new().with("a", 1).with("b", 1);
        let skip: SkipSet = ["b".to_string()].into_iter().collect();

        let outcome = evaluator.evaluate(&compiled.groups()[0], &record, &skip);
        assert_eq!(outcome.considered, 1);
        assert!(outcome.passed, "XOR over the single non-skipped rule");
    }
}
