//! Caching layer for eligify-runtime.
//!
//! Memoizes full evaluation results keyed by criteria fingerprint and record
//! fingerprint. Each criteria id also carries a generation counter that is
//! part of the key; [`EvaluationCache::invalidate`] bumps it, so no read after
//! an invalidation can see an entry written before it.
//!
//! The cache is an optimization only. Backend failures are logged and treated
//! as misses.

use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use eligify_core::{CompiledCriteria, EvaluationResult, Record};

use crate::config::CacheConfig;

/// Errors from a cache backend.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Cache key for evaluation results.
///
/// Name and version are copied into the result, so snapshots with identical
/// rules still get separate entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub criteria_id: String,
    pub criteria_name: String,
    pub criteria_version: Option<u32>,
    pub generation: u64,
    pub criteria_fingerprint: String,
    pub record_fingerprint: String,
}

/// Storage behind [`EvaluationCache`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<EvaluationResult>, CacheError>;

    async fn put(&self, key: CacheKey, result: EvaluationResult) -> Result<(), CacheError>;

    /// Drop every entry for `criteria_id`. Correctness never depends on this;
    /// it only frees space held by superseded generations.
    async fn invalidate_criteria(&self, criteria_id: &str) -> Result<(), CacheError>;

    fn entry_count(&self) -> u64;
}

/// In-process backend using moka.
pub struct MokaBackend {
    cache: Cache<CacheKey, EvaluationResult>,
}

impl MokaBackend {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheBackend for MokaBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<EvaluationResult>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn put(&self, key: CacheKey, result: EvaluationResult) -> Result<(), CacheError> {
        self.cache.insert(key, result).await;
        Ok(())
    }

    async fn invalidate_criteria(&self, criteria_id: &str) -> Result<(), CacheError> {
        let id = criteria_id.to_string();
        self.cache
            .invalidate_entries_if(move |key, _| key.criteria_id == id)
            .map(|_| ())
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub entries: u64,
}

/// Evaluation cache with per-criteria generations.
pub struct EvaluationCache {
    backend: Arc<dyn CacheBackend>,
    generations: RwLock<HashMap<String, u64>>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl EvaluationCache {
    /// Create a moka-backed cache.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self::with_backend(Arc::new(MokaBackend::new(max_entries, ttl)))
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            generations: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Current generation of `criteria_id`.
    pub fn generation(&self, criteria_id: &str) -> u64 {
        self.generations.read().get(criteria_id).copied().unwrap_or(0)
    }

    pub fn key(&self, criteria: &CompiledCriteria, record: &Record) -> CacheKey {
        CacheKey {
            criteria_id: criteria.id().to_string(),
            criteria_name: criteria.name().to_string(),
            criteria_version: criteria.version(),
            generation: self.generation(criteria.id()),
            criteria_fingerprint: criteria.fingerprint().to_string(),
            record_fingerprint: record.fingerprint(),
        }
    }

    /// Look up a result. Backend errors count as misses.
    pub async fn get(&self, key: &CacheKey) -> Option<EvaluationResult> {
        let found = match self.backend.get(key).await {
            Ok(found) => found,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(criteria = %key.criteria_id, error = %e, "Cache read failed, evaluating uncached");
                None
            }
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(criteria = %key.criteria_id, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(criteria = %key.criteria_id, "Cache miss");
        }
        found
    }

    /// Store a result. Backend errors are logged and dropped.
    pub async fn put(&self, key: CacheKey, result: EvaluationResult) {
        let criteria_id = key.criteria_id.clone();
        if let Err(e) = self.backend.put(key, result).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(criteria = %criteria_id, error = %e, "Cache write failed");
        }
    }

    /// Invalidate every cached result for `criteria_id`.
    ///
    /// The generation bump happens before this returns, so any lookup that
    /// starts afterwards builds a key the old entries cannot match.
    pub async fn invalidate(&self, criteria_id: &str) {
        let generation = {
            let mut generations = self.generations.write();
            let entry = generations.entry(criteria_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        tracing::info!(criteria = %criteria_id, generation, "Invalidated cached evaluations");

        if let Err(e) = self.backend.invalidate_criteria(criteria_id).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(criteria = %criteria_id, error = %e, "Cache cleanup failed");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            entries: self.backend.entry_count(),
        }
    }
}

impl Default for EvaluationCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eligify_core::{Criteria, Engine, Rule};

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &CacheKey) -> Result<Option<EvaluationResult>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn put(&self, _key: CacheKey, _result: EvaluationResult) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn invalidate_criteria(&self, _criteria_id: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        fn entry_count(&self) -> u64 {
            0
        }
    }

    fn fixture() -> (CompiledCriteria, Record, EvaluationResult) {
        let criteria = Criteria::new("Adults")
            .rule(Rule::new("age", ">=", 18))
            .compile()
            .unwrap();
        let record = Record::new().with("age", 30);
        let result = Engine::new().evaluate(&criteria, &record).unwrap();
        (criteria, record, result)
    }

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = EvaluationCache::default();
        let (criteria, record, result) = fixture();
        let key = cache.key(&criteria, &record);

        // Cache miss
        assert!(cache.get(&key).await.is_none());

        cache.put(key.clone(), result.clone()).await;

        // Cache hit
        let cached = cache.get(&key).await;
        assert_eq!(cached, Some(result));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate_changes_key() {
        let cache = EvaluationCache::default();
        let (criteria, record, result) = fixture();

        let before = cache.key(&criteria, &record);
        cache.put(before.clone(), result).await;
        cache.invalidate(criteria.id()).await;

        let after = cache.key(&criteria, &record);
        assert_ne!(before, after);
        assert_eq!(after.generation, 1);
        assert!(cache.get(&after).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidation_is_per_criteria() {
        let cache = EvaluationCache::default();
        cache.invalidate("a").await;
        cache.invalidate("a").await;
        assert_eq!(cache.generation("a"), 2);
        assert_eq!(cache.generation("b"), 0);
    }

    #[tokio::test]
    async fn test_broken_backend_fails_open() {
        let cache = EvaluationCache::with_backend(Arc::new(BrokenBackend));
        let (criteria, record, result) = fixture();
        let key = cache.key(&criteria, &record);

        cache.put(key.clone(), result).await;
        assert!(cache.get(&key).await.is_none());
        cache.invalidate(criteria.id()).await;

        let stats = cache.stats();
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.misses, 1);
    }
}
