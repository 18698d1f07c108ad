//! Audit boundary: where evaluations go when a caller asks to record them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use eligify_core::EvaluationResult;

use crate::RuntimeError;

/// One recorded evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub criteria_id: String,
    pub criteria_fingerprint: String,
    pub record_fingerprint: String,
    pub recorded_at: DateTime<Utc>,
    pub result: EvaluationResult,
}

impl EvaluationRecord {
    pub fn new(record_fingerprint: impl Into<String>, result: EvaluationResult) -> Self {
        Self {
            criteria_id: result.criteria_id.clone(),
            criteria_fingerprint: result.fingerprint.clone(),
            record_fingerprint: record_fingerprint.into(),
            recorded_at: Utc::now(),
            result,
        }
    }
}

/// Receives evaluations for audit.
#[async_trait]
pub trait EvaluationRecorder: Send + Sync {
    async fn record(&self, entry: EvaluationRecord) -> Result<(), RuntimeError>;
}

/// Writes each evaluation as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingRecorder;

#[async_trait]
impl EvaluationRecorder for TracingRecorder {
    async fn record(&self, entry: EvaluationRecord) -> Result<(), RuntimeError> {
        tracing::info!(
            criteria = %entry.criteria_id,
            criteria_fingerprint = %entry.criteria_fingerprint,
            record_fingerprint = %entry.record_fingerprint,
            passed = entry.result.passed,
            score = entry.result.score,
            decision = %entry.result.decision,
            failed = entry.result.failed_rules.len(),
            "Evaluation recorded"
        );
        Ok(())
    }
}

/// Keeps recorded evaluations in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    entries: Mutex<Vec<EvaluationRecord>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<EvaluationRecord> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl EvaluationRecorder for InMemoryRecorder {
    async fn record(&self, entry: EvaluationRecord) -> Result<(), RuntimeError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eligify_core::{evaluate, Criteria, Record, Rule};

    #[tokio::test]
    async fn test_in_memory_recorder_keeps_entries() {
        let criteria = Criteria::new("Adults").rule(Rule::new("age", ">=", 18));
        let record = Record::new().with("age", 40);
        let result = evaluate(&criteria, &record).unwrap();

        let recorder = InMemoryRecorder::new();
        assert!(recorder.is_empty());
        recorder
            .record(EvaluationRecord::new(record.fingerprint(), result.clone()))
            .await
            .unwrap();

        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].criteria_id, "Adults");
        assert_eq!(entries[0].criteria_fingerprint, result.fingerprint);
        assert_eq!(entries[0].record_fingerprint, record.fingerprint());
    }

    #[tokio::test]
    async fn test_tracing_recorder_accepts_entries() {
        let criteria = Criteria::new("Adults").rule(Rule::new("age", ">=", 18));
        let record = Record::new().with("age", 10);
        let result = evaluate(&criteria, &record).unwrap();
        assert!(TracingRecorder
            .record(EvaluationRecord::new(record.fingerprint(), result))
            .await
            .is_ok());
    }
}
