//! Evaluation orchestrator.
//!
//! Composes the pure engine with the runtime collaborators:
//! - cache lookup before evaluation, cache store after a miss
//! - batch evaluation on a bounded worker pool, off the async executor
//! - version-pinned evaluation through a [`CriteriaRepository`]
//! - optional audit recording and workflow dispatch after the verdict
//!
//! None of the collaborators can change a verdict. Cache, recorder and
//! handler failures are logged and evaluation carries on.

use std::sync::Arc;

use eligify_core::{
    BatchResult, CompiledCriteria, Engine, EngineOptions, EvaluationResult, Record,
};

use crate::audit::{EvaluationRecord, EvaluationRecorder};
use crate::cache::{CacheBackend, CacheKey, CacheStats, EvaluationCache};
use crate::config::RuntimeConfig;
use crate::repository::CriteriaRepository;
use crate::workflow::{DispatchReport, Workflow};
use crate::RuntimeError;

/// Per-call switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluateOptions {
    pub use_cache: bool,
    pub record_result: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            record_result: false,
        }
    }
}

impl EvaluateOptions {
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Default::default()
        }
    }

    pub fn recorded(mut self) -> Self {
        self.record_result = true;
        self
    }
}

/// The orchestrator. Build one with [`EvaluationOrchestrator::builder`] and
/// share it; every method takes `&self`.
pub struct EvaluationOrchestrator {
    engine: Arc<Engine>,
    config: RuntimeConfig,
    cache: Option<EvaluationCache>,
    repository: Option<Arc<dyn CriteriaRepository>>,
    recorder: Option<Arc<dyn EvaluationRecorder>>,
    workflow: Workflow,
}

impl EvaluationOrchestrator {
    pub fn builder() -> EvaluationOrchestratorBuilder {
        EvaluationOrchestratorBuilder::default()
    }

    /// Options implied by the configuration.
    pub fn default_options(&self) -> EvaluateOptions {
        EvaluateOptions {
            use_cache: self.cache.is_some(),
            record_result: self.config.record_results,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Rule conditions actually checked since construction.
    pub fn rule_invocations(&self) -> u64 {
        self.engine.rule_invocations()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(EvaluationCache::stats)
    }

    /// Evaluate one record.
    pub async fn evaluate(
        &self,
        criteria: &CompiledCriteria,
        record: &Record,
        options: EvaluateOptions,
    ) -> Result<EvaluationResult, RuntimeError> {
        let (result, _) = self.evaluate_with_report(criteria, record, options).await?;
        Ok(result)
    }

    /// Like [`evaluate`](Self::evaluate), also returning what the workflow
    /// dispatch did. Handler failures show up in the report; the result is
    /// the same either way.
    pub async fn evaluate_with_report(
        &self,
        criteria: &CompiledCriteria,
        record: &Record,
        options: EvaluateOptions,
    ) -> Result<(EvaluationResult, DispatchReport), RuntimeError> {
        let cache = self.cache.as_ref().filter(|_| options.use_cache);

        let key = cache.map(|c| c.key(criteria, record));
        if let (Some(cache), Some(key)) = (cache, key.as_ref()) {
            if let Some(hit) = cache.get(key).await {
                let report = self.after_evaluation(record, &hit, options).await;
                return Ok((hit, report));
            }
        }

        let result = self.engine.evaluate(criteria, record)?;

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.put(key, result.clone()).await;
        }

        let report = self.after_evaluation(record, &result, options).await;
        Ok((result, report))
    }

    /// Evaluate many records against one criteria.
    ///
    /// Cached results are reused; the rest run on a blocking worker pool
    /// bounded by `batch.concurrency`. With `batch.timeout` set, the whole
    /// batch fails with [`RuntimeError::Timeout`] once it is exceeded.
    pub async fn evaluate_batch(
        &self,
        criteria: Arc<CompiledCriteria>,
        records: Vec<Record>,
        options: EvaluateOptions,
    ) -> Result<BatchResult, RuntimeError> {
        let cache = self.cache.as_ref().filter(|_| options.use_cache);

        let mut slots: Vec<Option<EvaluationResult>> = vec![None; records.len()];
        // Keys are built once, before evaluation, and reused for the store.
        let mut pending: Vec<(usize, Option<CacheKey>)> = Vec::new();
        if let Some(cache) = cache {
            for (i, record) in records.iter().enumerate() {
                let key = cache.key(&criteria, record);
                match cache.get(&key).await {
                    Some(hit) => slots[i] = Some(hit),
                    None => pending.push((i, Some(key))),
                }
            }
        } else {
            pending.extend((0..records.len()).map(|i| (i, None)));
        }

        let evaluated_count = pending.len();
        if !pending.is_empty() {
            let to_evaluate: Vec<Record> = pending.iter().map(|(i, _)| records[*i].clone()).collect();
            let evaluated = self.run_blocking_batch(criteria.clone(), to_evaluate).await?;

            for ((i, key), result) in pending.into_iter().zip(evaluated.results) {
                if let (Some(cache), Some(key)) = (cache, key) {
                    cache.put(key, result.clone()).await;
                }
                slots[i] = Some(result);
            }
        }

        let results: Vec<EvaluationResult> = slots.into_iter().flatten().collect();
        for (record, result) in records.iter().zip(&results) {
            self.after_evaluation(record, result, options).await;
        }

        let batch = BatchResult::from_results(results);
        tracing::info!(
            criteria = %criteria.id(),
            total = batch.total_evaluated,
            passed = batch.total_passed,
            failed = batch.total_failed,
            cached = batch.total_evaluated - evaluated_count,
            "Batch complete"
        );
        Ok(batch)
    }

    /// Evaluate against a specific stored version of a criteria.
    pub async fn evaluate_version(
        &self,
        name: &str,
        version: u32,
        record: &Record,
        options: EvaluateOptions,
    ) -> Result<EvaluationResult, RuntimeError> {
        let repository = self.repository.as_ref().ok_or(RuntimeError::NoRepository)?;
        let snapshot = repository
            .version(name, version)
            .await?
            .ok_or_else(|| RuntimeError::VersionNotFound {
                name: name.to_string(),
                version,
            })?;
        self.evaluate(&snapshot, record, options).await
    }

    /// Evaluate against the latest stored version of a criteria.
    pub async fn evaluate_latest(
        &self,
        name: &str,
        record: &Record,
        options: EvaluateOptions,
    ) -> Result<EvaluationResult, RuntimeError> {
        let repository = self.repository.as_ref().ok_or(RuntimeError::NoRepository)?;
        let snapshot = repository
            .latest(name)
            .await?
            .ok_or_else(|| RuntimeError::CriteriaNotFound(name.to_string()))?;
        self.evaluate(&snapshot, record, options).await
    }

    /// Signal that the rules of `criteria_id` changed. Cached results for it
    /// are unreachable once this returns.
    pub async fn criteria_updated(&self, criteria_id: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(criteria_id).await;
        }
    }

    async fn run_blocking_batch(
        &self,
        criteria: Arc<CompiledCriteria>,
        records: Vec<Record>,
    ) -> Result<BatchResult, RuntimeError> {
        let engine = self.engine.clone();
        let concurrency = self.config.batch.concurrency;
        let handle = tokio::task::spawn_blocking(move || {
            engine.evaluate_batch(&criteria, &records, concurrency)
        });

        let joined = match self.config.batch.timeout {
            Some(limit) => tokio::time::timeout(limit, handle)
                .await
                .map_err(|_| RuntimeError::Timeout(limit))?,
            None => handle.await,
        };

        let batch = joined.map_err(|e| RuntimeError::Join(e.to_string()))??;
        Ok(batch)
    }

    async fn after_evaluation(
        &self,
        record: &Record,
        result: &EvaluationResult,
        options: EvaluateOptions,
    ) -> DispatchReport {
        if options.record_result {
            if let Some(recorder) = &self.recorder {
                let entry = EvaluationRecord::new(record.fingerprint(), result.clone());
                if let Err(e) = recorder.record(entry).await {
                    tracing::warn!(criteria = %result.criteria_id, error = %e, "Failed to record evaluation");
                }
            }
        }

        if self.workflow.is_empty() {
            return DispatchReport::default();
        }
        self.workflow.dispatch(result).await
    }
}

/// Builder for [`EvaluationOrchestrator`].
#[derive(Default)]
pub struct EvaluationOrchestratorBuilder {
    config: RuntimeConfig,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    repository: Option<Arc<dyn CriteriaRepository>>,
    recorder: Option<Arc<dyn EvaluationRecorder>>,
    workflow: Workflow,
}

impl EvaluationOrchestratorBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the in-process moka cache with another backend.
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn CriteriaRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn EvaluationRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn build(self) -> EvaluationOrchestrator {
        let cache = if self.config.cache.enabled {
            Some(match self.cache_backend {
                Some(backend) => EvaluationCache::with_backend(backend),
                None => EvaluationCache::from_config(&self.config.cache),
            })
        } else {
            None
        };

        let engine = Engine::with_options(EngineOptions {
            default_decision: self.config.default_decision.clone(),
        });

        EvaluationOrchestrator {
            engine: Arc::new(engine),
            config: self.config,
            cache,
            repository: self.repository,
            recorder: self.recorder,
            workflow: self.workflow,
        }
    }
}
