//! Persistence boundary for criteria definitions.
//!
//! The engine never stores criteria itself; it asks a [`CriteriaRepository`]
//! for an immutable compiled snapshot. Versions are whole snapshots, so
//! version-pinned evaluation is just evaluation against an older snapshot.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use eligify_core::{CompiledCriteria, Criteria};

use crate::RuntimeError;

/// Source of compiled criteria snapshots, keyed by criteria name.
#[async_trait]
pub trait CriteriaRepository: Send + Sync {
    /// Most recent snapshot of `name`.
    async fn latest(&self, name: &str) -> Result<Option<Arc<CompiledCriteria>>, RuntimeError>;

    /// Snapshot `version` of `name`.
    async fn version(
        &self,
        name: &str,
        version: u32,
    ) -> Result<Option<Arc<CompiledCriteria>>, RuntimeError>;
}

/// Versioned in-memory store.
///
/// Each [`publish`](Self::publish) compiles the definition and appends it as
/// the next version (starting at 1). Published snapshots are never modified.
#[derive(Default)]
pub struct InMemoryCriteriaRepository {
    snapshots: RwLock<HashMap<String, Vec<Arc<CompiledCriteria>>>>,
}

impl InMemoryCriteriaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and store `criteria` as a new version. Returns the version number.
    pub fn publish(&self, mut criteria: Criteria) -> Result<u32, RuntimeError> {
        let mut snapshots = self.snapshots.write();
        let version = snapshots.get(&criteria.name).map_or(0, |v| v.len()) as u32 + 1;

        criteria.version = Some(version);
        let compiled = criteria.compile()?;
        snapshots
            .entry(criteria.name.clone())
            .or_default()
            .push(Arc::new(compiled));

        tracing::info!(criteria = %criteria.name, version, "Published criteria version");
        Ok(version)
    }

    /// Published version numbers of `name`, oldest first.
    pub fn versions(&self, name: &str) -> Vec<u32> {
        self.snapshots
            .read()
            .get(name)
            .map(|v| (1..=v.len() as u32).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CriteriaRepository for InMemoryCriteriaRepository {
    async fn latest(&self, name: &str) -> Result<Option<Arc<CompiledCriteria>>, RuntimeError> {
        Ok(self
            .snapshots
            .read()
            .get(name)
            .and_then(|versions| versions.last().cloned()))
    }

    async fn version(
        &self,
        name: &str,
        version: u32,
    ) -> Result<Option<Arc<CompiledCriteria>>, RuntimeError> {
        if version == 0 {
            return Ok(None);
        }
        Ok(self
            .snapshots
            .read()
            .get(name)
            .and_then(|versions| versions.get(version as usize - 1).cloned()))
    }
}
