//! Runtime configuration.
//!
//! Loadable from YAML; every field has a default so an empty document is a
//! valid configuration. Durations are written human-readably (`"1h"`, `"30s"`).
//!
//! ```yaml
//! cache:
//!   enabled: true
//!   max_entries: 10000
//!   ttl: 1h
//! batch:
//!   concurrency: 8
//!   timeout: 30s
//! default_decision: Under Review
//! record_results: false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use eligify_core::DEFAULT_DECISION;

use crate::RuntimeError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cache: CacheConfig,
    pub batch: BatchConfig,

    /// Label used when no decision band matches.
    pub default_decision: String,

    /// Whether evaluations are sent to the recorder unless a call says otherwise.
    pub record_results: bool,
}

/// Evaluation cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "duration_human")]
    pub ttl: Duration,
}

/// Batch evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads per batch.
    pub concurrency: usize,

    /// Upper bound on a whole batch; `None` waits indefinitely.
    #[serde(with = "option_duration_human", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

mod option_duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => humantime::parse_duration(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout: None,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            default_decision: DEFAULT_DECISION.to_string(),
            record_results: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeError> {
        let config: RuntimeConfig =
            serde_yaml::from_str(yaml).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.batch.concurrency == 0 {
            return Err(RuntimeError::Config(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(RuntimeError::Config(
                "cache.ttl must be positive when the cache is enabled".to_string(),
            ));
        }
        if self.default_decision.trim().is_empty() {
            return Err(RuntimeError::Config(
                "default_decision must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    pub fn with_cache_capacity(mut self, max_entries: u64) -> Self {
        self.cache.max_entries = max_entries;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.batch.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch.timeout = Some(timeout);
        self
    }

    pub fn with_default_decision(mut self, label: impl Into<String>) -> Self {
        self.default_decision = label.into();
        self
    }

    pub fn with_record_results(mut self, record: bool) -> Self {
        self.record_results = record;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert!(config.batch.concurrency >= 1);
        assert_eq!(config.batch.timeout, None);
        assert_eq!(config.default_decision, "Under Review");
        assert!(!config.record_results);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_human_durations() {
        let yaml = r#"
cache:
  ttl: 15m
batch:
  concurrency: 3
  timeout: 30s
record_results: true
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(900));
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.batch.concurrency, 3);
        assert_eq!(config.batch.timeout, Some(Duration::from_secs(30)));
        assert!(config.record_results);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RuntimeConfig::from_yaml("batch: { concurrency: 0 }").is_err());
        assert!(RuntimeConfig::from_yaml("cache: { ttl: soon }").is_err());
        assert!(RuntimeConfig::from_yaml("default_decision: '  '").is_err());
    }

    #[test]
    fn test_builders() {
        let config = RuntimeConfig::default()
            .without_cache()
            .with_concurrency(0)
            .with_batch_timeout(Duration::from_secs(5))
            .with_default_decision("pending");
        assert!(!config.cache.enabled);
        assert_eq!(config.batch.concurrency, 1);
        assert_eq!(config.batch.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.default_decision, "pending");
    }
}
