//! # eligify-runtime
//!
//! Async service layer around `eligify-core`.
//!
//! The core engine is pure and synchronous. This crate adds what a service
//! needs around it:
//! - an evaluation cache keyed by criteria and record fingerprints
//! - batch evaluation on a bounded worker pool with an optional timeout
//! - version-pinned evaluation through a [`CriteriaRepository`]
//! - audit recording and workflow triggers, run after the verdict
//!
//! ## Example
//!
//! ```rust,ignore
//! use eligify_runtime::{EvaluateOptions, EvaluationOrchestrator, RuntimeConfig};
//!
//! let orchestrator = EvaluationOrchestrator::builder()
//!     .config(RuntimeConfig::from_yaml_file("eligify.yaml")?)
//!     .build();
//!
//! let criteria = Criteria::from_yaml_file("loan.yaml")?.compile()?;
//! let result = orchestrator
//!     .evaluate(&criteria, &record, EvaluateOptions::default())
//!     .await?;
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod repository;
pub mod workflow;

pub use audit::{EvaluationRecord, EvaluationRecorder, InMemoryRecorder, TracingRecorder};
pub use cache::{CacheBackend, CacheError, CacheKey, CacheStats, EvaluationCache, MokaBackend};
pub use config::{BatchConfig, CacheConfig, RuntimeConfig};
pub use orchestrator::{EvaluateOptions, EvaluationOrchestrator, EvaluationOrchestratorBuilder};
pub use repository::{CriteriaRepository, InMemoryCriteriaRepository};
pub use workflow::{
    Action, ActionError, ActionHandler, DispatchReport, Trigger, TriggerCondition, Workflow,
};

use std::time::Duration;
use thiserror::Error;

use eligify_core::{CriteriaError, EvaluationError};

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Criteria(#[from] CriteriaError),

    #[error("Criteria not found: {0}")]
    CriteriaNotFound(String),

    #[error("Criteria '{name}' has no version {version}")]
    VersionNotFound { name: String, version: u32 },

    #[error("No criteria repository configured")]
    NoRepository,

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Batch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Batch worker failed: {0}")]
    Join(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
