//! Criteria documents: definition types and YAML/JSON loading.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::compile::{self, CompiledCriteria};
use super::schema::validate_criteria_schema;
use crate::comparator::ConditionError;
use crate::decision::DecisionThreshold;
use crate::group::CombinationLogic;
use crate::scoring::ScoringMethod;

/// Errors that can occur when loading or compiling criteria.
///
/// All of these are configuration errors: they are raised before any record
/// is evaluated and reject the criteria as a whole.
#[derive(Error, Debug)]
pub enum CriteriaError {
    #[error("Failed to read criteria file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Criteria does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Criteria validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Invalid condition in {location}: {source}")]
    InvalidCondition {
        location: String,
        #[source]
        source: ConditionError,
    },

    #[error("Group '{group}' references unknown subgroup '{subgroup}'")]
    UnknownGroup { group: String, subgroup: String },

    #[error("Group '{0}' is nested inside itself")]
    CircularGroup(String),

    #[error("Group '{group}' has more than one parent ('{first}' and '{second}')")]
    MultipleParents {
        group: String,
        first: String,
        second: String,
    },

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// A predicate that must hold before a rule is evaluated.
///
/// Dependencies are data predicates over the record, not references to other
/// rules, so they can never form cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

/// A single weighted condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Defaults to `rule-<n>` by position when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Dot-notation path into the record.
    pub field: String,

    pub operator: String,

    #[serde(default)]
    pub value: Value,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub order: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Dependency>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Rule {
    /// A rule with weight 1, active, no dependency.
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: None,
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
            weight: default_weight(),
            active: true,
            order: 0,
            depends_on: None,
            description: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn depends_on(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.depends_on = Some(Dependency {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        });
        self
    }
}

/// A named set of rules (and subgroups) combined by one logic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleGroup {
    /// Defaults to `group-<n>` by position when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub logic: CombinationLogic,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Ids of groups nested inside this one.
    #[serde(default)]
    pub subgroups: Vec<String>,
}

impl RuleGroup {
    pub fn new(name: impl Into<String>, logic: CombinationLogic) -> Self {
        Self {
            id: None,
            name: name.into(),
            logic,
            weight: default_weight(),
            order: 0,
            rules: Vec::new(),
            subgroups: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn subgroup(mut self, id: impl Into<String>) -> Self {
        self.subgroups.push(id.into());
        self
    }
}

/// A named, versionable set of rules and groups plus scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criteria {
    /// Stable identifier; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Snapshot number, assigned by whoever stores versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Minimum score to pass (0–100, or absolute units for `sum`).
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    #[serde(default)]
    pub scoring_method: ScoringMethod,

    #[serde(default)]
    pub decision_thresholds: Vec<DecisionThreshold>,

    /// Label when no decision band matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_decision: Option<String>,

    /// How top-level groups combine. Defaults to ALL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_logic: Option<CombinationLogic>,

    /// Ungrouped rules.
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

impl Criteria {
    /// An empty, active criteria using weighted scoring and a pass threshold of 65.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            version: None,
            active: true,
            pass_threshold: default_pass_threshold(),
            scoring_method: ScoringMethod::default(),
            decision_thresholds: Vec::new(),
            default_decision: None,
            group_logic: None,
            rules: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Parse criteria from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CriteriaError> {
        let document: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(document)
    }

    /// Parse criteria from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CriteriaError> {
        let document: Value = serde_json::from_str(json)?;
        Self::from_value(document)
    }

    /// Validate a JSON document against the schema, then deserialize it.
    pub fn from_value(document: Value) -> Result<Self, CriteriaError> {
        validate_criteria_schema(&document).map_err(CriteriaError::SchemaError)?;
        let criteria: Criteria = serde_json::from_value(document)?;
        criteria.validate()?;
        Ok(criteria)
    }

    /// Parse criteria from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse criteria from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a file, choosing JSON or YAML by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Identifier used for cache keys and repositories.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn with_scoring(mut self, method: ScoringMethod) -> Self {
        self.scoring_method = method;
        self
    }

    pub fn with_group_logic(mut self, logic: CombinationLogic) -> Self {
        self.group_logic = Some(logic);
        self
    }

    pub fn threshold(mut self, min_score: f64, label: impl Into<String>) -> Self {
        self.decision_thresholds
            .push(DecisionThreshold::new(min_score, label));
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn group(mut self, group: RuleGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Compile into an immutable, validated snapshot ready for evaluation.
    pub fn compile(&self) -> Result<CompiledCriteria, CriteriaError> {
        self.validate()?;
        compile::compile(self)
    }

    /// Check the parts of the definition that do not need compilation.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.name.trim().is_empty() {
            return Err(CriteriaError::MissingField("name".to_string()));
        }

        if !self.pass_threshold.is_finite() || self.pass_threshold < 0.0 {
            return Err(CriteriaError::InvalidThreshold(format!(
                "pass_threshold must be a non-negative number, got {}",
                self.pass_threshold
            )));
        }
        if self.scoring_method.is_normalized() && self.pass_threshold > 100.0 {
            return Err(CriteriaError::InvalidThreshold(format!(
                "pass_threshold {} exceeds 100 for {} scoring",
                self.pass_threshold, self.scoring_method
            )));
        }

        for band in &self.decision_thresholds {
            if !band.min_score.is_finite() || band.label.trim().is_empty() {
                return Err(CriteriaError::InvalidThreshold(format!(
                    "decision band '{}' at {} is not usable",
                    band.label, band.min_score
                )));
            }
        }

        let weights = self
            .rules
            .iter()
            .map(|r| r.weight)
            .chain(self.groups.iter().map(|g| g.weight))
            .chain(self.groups.iter().flat_map(|g| g.rules.iter().map(|r| r.weight)));
        for weight in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CriteriaError::ValidationError(format!(
                    "weights must be non-negative numbers, got {}",
                    weight
                )));
            }
        }

        Ok(())
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_pass_threshold() -> f64 {
    65.0
}
