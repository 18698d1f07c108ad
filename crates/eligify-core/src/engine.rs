//! The evaluation pipeline.
//!
//! DependencyResolver → GroupEvaluator / RuleEvaluator → ScoringEngine →
//! DecisionResolver. The engine holds no per-evaluation state; the only thing
//! it mutates is the rule-invocation counter.

use chrono::Utc;
use serde_json::Value;
use std::time::Instant;

use crate::criteria::CompiledCriteria;
use crate::decision::{DecisionResolver, DEFAULT_DECISION};
use crate::dependency::DependencyResolver;
use crate::group::GroupEvaluator;
use crate::record::Record;
use crate::result::{EvaluationResult, FailedRule, GroupOutcome, RuleOutcome};
use crate::rule::RuleEvaluator;
use crate::scoring::{ScoreUnit, ScoringEngine};
use crate::EvaluationError;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Label used when no decision band matches and the criteria sets none.
    pub default_decision: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_decision: DEFAULT_DECISION.to_string(),
        }
    }
}

/// Evaluates records against compiled criteria.
///
/// Cheap to share: wrap it in an `Arc` and call [`evaluate`](Self::evaluate)
/// from as many threads as needed.
#[derive(Debug)]
pub struct Engine {
    rules: RuleEvaluator,
    dependencies: DependencyResolver,
    scoring: ScoringEngine,
    decisions: DecisionResolver,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            rules: RuleEvaluator::new(),
            dependencies: DependencyResolver::new(),
            scoring: ScoringEngine::new(),
            decisions: DecisionResolver::new(options.default_decision),
        }
    }

    /// Total rule conditions checked by this engine.
    pub fn rule_invocations(&self) -> u64 {
        self.rules.invocations()
    }

    /// Evaluate a JSON value, which must be an object.
    pub fn evaluate_value(
        &self,
        criteria: &CompiledCriteria,
        value: Value,
    ) -> Result<EvaluationResult, EvaluationError> {
        let record = Record::from_value(value).ok_or(EvaluationError::InvalidRecord)?;
        self.evaluate(criteria, &record)
    }

    pub fn evaluate(
        &self,
        criteria: &CompiledCriteria,
        record: &Record,
    ) -> Result<EvaluationResult, EvaluationError> {
        if !criteria.is_active() {
            return Err(EvaluationError::Inactive(criteria.id().to_string()));
        }

        let started = Instant::now();
        let skip = self.dependencies.resolve(criteria.all_rules(), record);

        let (top_level_passed, units, execution_log, groups) = if criteria.is_grouped() {
            let evaluator = GroupEvaluator::new(&self.rules);
            let groups: Vec<GroupOutcome> = criteria
                .groups()
                .iter()
                .map(|group| evaluator.evaluate(group, record, &skip))
                .collect();

            let passed_groups = groups.iter().filter(|g| g.passed).count();
            let top_level_passed = criteria.group_logic().passes(passed_groups, groups.len());

            let units: Vec<ScoreUnit> = groups
                .iter()
                .map(|g| ScoreUnit::new(g.passed, g.weight))
                .collect();

            let mut flattened: Vec<&RuleOutcome> = Vec::new();
            for group in &groups {
                group.collect_rules(&mut flattened);
            }
            let execution_log: Vec<RuleOutcome> = flattened.into_iter().cloned().collect();

            (top_level_passed, units, execution_log, groups)
        } else {
            let execution_log: Vec<RuleOutcome> = criteria
                .rules()
                .iter()
                .map(|rule| self.rules.evaluate(rule, record, &skip))
                .collect();

            let units: Vec<ScoreUnit> = execution_log
                .iter()
                .map(|outcome| {
                    if outcome.skipped {
                        ScoreUnit::skipped(outcome.weight)
                    } else {
                        ScoreUnit::new(outcome.passed, outcome.weight)
                    }
                })
                .collect();

            (true, units, execution_log, Vec::new())
        };

        let score = self.scoring.score(&units, criteria.scoring_method());
        let passed = top_level_passed && score >= criteria.pass_threshold();

        let fallback = criteria
            .default_decision()
            .unwrap_or_else(|| self.decisions.default_label());
        let decision = self
            .decisions
            .resolve_or(score, criteria.thresholds(), fallback);

        let failed_rules: Vec<FailedRule> = execution_log
            .iter()
            .filter(|outcome| outcome.is_failure())
            .map(FailedRule::from)
            .collect();

        let duration_us = started.elapsed().as_micros() as u64;

        tracing::debug!(
            criteria = %criteria.id(),
            score,
            passed,
            decision = %decision,
            failed = failed_rules.len(),
            skipped = skip.len(),
            duration_us,
            "Evaluated record"
        );

        Ok(EvaluationResult {
            criteria_id: criteria.id().to_string(),
            criteria_name: criteria.name().to_string(),
            criteria_version: criteria.version(),
            passed,
            score,
            decision,
            scoring_method: criteria.scoring_method(),
            failed_rules,
            execution_log,
            groups,
            fingerprint: criteria.fingerprint().to_string(),
            evaluated_at: Utc::now(),
            duration_us,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
