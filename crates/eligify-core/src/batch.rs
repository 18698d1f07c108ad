//! Batch evaluation of many records against one criteria.
//!
//! Records are independent, so they are evaluated on a rayon pool bounded by
//! the requested concurrency. Results keep input order; the pass/fail
//! counts are reduced once all records are done.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::criteria::CompiledCriteria;
use crate::engine::Engine;
use crate::record::Record;
use crate::result::EvaluationResult;
use crate::EvaluationError;

/// Aggregate output of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total_evaluated: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub results: Vec<EvaluationResult>,
}

impl BatchResult {
    /// Build from per-record results in input order.
    pub fn from_results(results: Vec<EvaluationResult>) -> Self {
        let total_passed = results.iter().filter(|r| r.passed).count();
        Self {
            total_evaluated: results.len(),
            total_passed,
            total_failed: results.len() - total_passed,
            results,
        }
    }
}

impl Engine {
    /// Evaluate every record with at most `concurrency` worker threads.
    ///
    /// Fails as a whole only when the criteria itself cannot be evaluated
    /// (inactive) or the pool cannot be built.
    pub fn evaluate_batch(
        &self,
        criteria: &CompiledCriteria,
        records: &[Record],
        concurrency: usize,
    ) -> Result<BatchResult, EvaluationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("eligify-batch-{}", i))
            .build()
            .map_err(|e| EvaluationError::WorkerPool(e.to_string()))?;

        let results = pool.install(|| {
            records
                .par_iter()
                .map(|record| self.evaluate(criteria, record))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let batch = BatchResult::from_results(results);
        tracing::info!(
            criteria = %criteria.id(),
            total = batch.total_evaluated,
            passed = batch.total_passed,
            failed = batch.total_failed,
            "Batch evaluated"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criteria, Rule};

    fn criteria() -> CompiledCriteria {
        Criteria::new("Adults")
            .with_pass_threshold(100.0)
            .rule(Rule::new("age", ">=", 18))
            .compile()
            .unwrap()
    }

    #[test]
    fn test_batch_counts_and_order() {
        let records: Vec<Record> = (0..50).map(|age| Record::new().with("age", age)).collect();
        let batch = Engine::new().evaluate_batch(&criteria(), &records, 4).unwrap();

        assert_eq!(batch.total_evaluated, 50);
        assert_eq!(batch.total_passed, 32);
        assert_eq!(batch.total_failed, 18);
        for (age, result) in batch.results.iter().enumerate() {
            assert_eq!(result.passed, age >= 18);
        }
    }

    #[test]
    fn test_batch_matches_sequential() {
        let compiled = criteria();
        let records: Vec<Record> = (10..30).map(|age| Record::new().with("age", age)).collect();
        let engine = Engine::new();

        let parallel = engine.evaluate_batch(&compiled, &records, 8).unwrap();
        let sequential: Vec<_> = records
            .iter()
            .map(|r| engine.evaluate(&compiled, r).unwrap().without_timing())
            .collect();
        let parallel: Vec<_> = parallel.results.iter().map(|r| r.without_timing()).collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_empty_batch() {
        let batch = Engine::new().evaluate_batch(&criteria(), &[], 0).unwrap();
        assert_eq!(batch.total_evaluated, 0);
        assert!(batch.results.is_empty());
    }
}
