//! Evaluation outputs.
//!
//! Everything here is produced fresh by each evaluation and never mutated
//! afterwards. [`EvaluationResult`] is the engine's sole output; the rule and
//! group outcomes inside it form the execution trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scoring::ScoringMethod;

/// Why a rule outcome is what it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    ValueMismatch,
    FieldMissing,
    Malformed,
    Skipped,
}

/// Trace of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub field: String,
    pub operator: String,
    pub expected: Value,

    /// Extracted value; `null` when the field was absent.
    pub actual: Option<Value>,

    /// Skipped rules report `true` so they never block an ALL group.
    pub passed: bool,

    /// Set when the rule's dependency was not met.
    pub skipped: bool,

    pub status: OutcomeStatus,
    pub weight: f64,

    /// Contribution: `weight` when passed and not skipped, else 0.
    pub score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_us: u64,
}

impl RuleOutcome {
    /// A non-skipped rule that did not pass.
    pub fn is_failure(&self) -> bool {
        !self.skipped && !self.passed
    }
}

/// Trace of one rule group, including its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub group_id: String,
    pub name: String,
    pub logic: String,
    pub weight: f64,
    pub passed: bool,

    /// `100 * passed_count / considered`, or 100 when nothing was considered.
    pub score: f64,

    /// Non-skipped rules plus subgroups.
    pub considered: usize,
    pub passed_count: usize,
    pub rules: Vec<RuleOutcome>,
    pub groups: Vec<GroupOutcome>,
}

impl GroupOutcome {
    /// Depth-first: this group's rules, then each subgroup's.
    pub fn collect_rules<'a>(&'a self, into: &mut Vec<&'a RuleOutcome>) {
        into.extend(self.rules.iter());
        for group in &self.groups {
            group.collect_rules(into);
        }
    }
}

/// A rule that counted against the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRule {
    pub rule_id: String,
    pub field: String,
    pub operator: String,
    pub expected: Value,
    pub actual: Option<Value>,
    pub reason: OutcomeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RuleOutcome> for FailedRule {
    fn from(outcome: &RuleOutcome) -> Self {
        Self {
            rule_id: outcome.rule_id.clone(),
            field: outcome.field.clone(),
            operator: outcome.operator.clone(),
            expected: outcome.expected.clone(),
            actual: outcome.actual.clone(),
            reason: outcome.status,
            error: outcome.error.clone(),
        }
    }
}

/// The verdict for one record against one criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub criteria_id: String,
    pub criteria_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_version: Option<u32>,

    pub passed: bool,

    /// 0–100, or the raw passed-weight sum for [`ScoringMethod::Sum`].
    pub score: f64,
    pub decision: String,
    pub scoring_method: ScoringMethod,
    pub failed_rules: Vec<FailedRule>,

    /// Every rule outcome in evaluation order (groups flattened depth-first).
    pub execution_log: Vec<RuleOutcome>,

    /// Group tree; empty for criteria made only of ungrouped rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupOutcome>,

    /// Structural fingerprint of the criteria that produced this result.
    pub fingerprint: String,
    pub evaluated_at: DateTime<Utc>,
    pub duration_us: u64,
}

impl EvaluationResult {
    /// Copy with timestamp and durations zeroed, for determinism checks.
    pub fn without_timing(&self) -> Self {
        fn strip_group(group: &mut GroupOutcome) {
            for rule in &mut group.rules {
                rule.duration_us = 0;
            }
            for child in &mut group.groups {
                strip_group(child);
            }
        }

        let mut copy = self.clone();
        copy.evaluated_at = DateTime::<Utc>::default();
        copy.duration_us = 0;
        for rule in &mut copy.execution_log {
            rule.duration_us = 0;
        }
        for group in &mut copy.groups {
            strip_group(group);
        }
        copy
    }

    /// Rules that were skipped because their dependency was unmet.
    pub fn skipped_rules(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.execution_log.iter().filter(|r| r.skipped)
    }

    /// One-line human-readable explanation.
    pub fn summary(&self) -> String {
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let mut summary = format!(
            "{} '{}': {} (score {:.2}, {})",
            verdict, self.criteria_name, self.decision, self.score, self.scoring_method
        );
        if !self.failed_rules.is_empty() {
            let fields: Vec<String> = self
                .failed_rules
                .iter()
                .map(|f| match f.reason {
                    OutcomeStatus::FieldMissing => format!("{} (missing)", f.field),
                    OutcomeStatus::Malformed => format!("{} (malformed rule)", f.field),
                    _ => format!("{} {} {}", f.field, f.operator, f.expected),
                })
                .collect();
            summary.push_str(&format!("; failed: {}", fields.join(", ")));
        }
        summary
    }
}
