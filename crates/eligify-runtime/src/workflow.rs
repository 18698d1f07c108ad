//! Workflow triggers: side effects declared as data.
//!
//! A [`Workflow`] is an ordered list of `(TriggerCondition, Action)` pairs.
//! After an evaluation has produced its result, every trigger whose condition
//! matches dispatches its action to the [`ActionHandler`] registered under
//! the action's name. Handlers see the finished result; nothing they do can
//! change it.
//!
//! ```yaml
//! - when: on_pass
//!   action: { name: notify, params: { channel: approvals } }
//! - when: { on_decision: review }
//!   action: { name: open_ticket }
//! - when: { score_below: 40 }
//!   action: { name: flag }
//! ```

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use eligify_core::EvaluationResult;

use crate::RuntimeError;

/// Errors from action handlers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("No handler registered for action '{0}'")]
    NoHandler(String),

    #[error("Action failed: {0}")]
    Failed(String),
}

/// When a trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    OnPass,
    OnFail,
    OnDecision(String),
    ScoreAtLeast(f64),
    ScoreBelow(f64),
    Always,
}

impl TriggerCondition {
    pub fn matches(&self, result: &EvaluationResult) -> bool {
        match self {
            TriggerCondition::OnPass => result.passed,
            TriggerCondition::OnFail => !result.passed,
            TriggerCondition::OnDecision(label) => result.decision == *label,
            TriggerCondition::ScoreAtLeast(min) => result.score >= *min,
            TriggerCondition::ScoreBelow(max) => result.score < *max,
            TriggerCondition::Always => true,
        }
    }
}

/// A named action with free-form parameters for its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,

    #[serde(default)]
    pub params: Value,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// A condition paired with the action it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub when: TriggerCondition,
    pub action: Action,
}

/// Performs an action. Implemented by the host application.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, action: &Action, result: &EvaluationResult) -> Result<(), ActionError>;
}

/// What a dispatch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Actions that completed, in trigger order.
    pub fired: Vec<String>,

    /// Actions that failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Declared triggers plus the handlers that carry them out.
#[derive(Default, Clone)]
pub struct Workflow {
    triggers: Vec<Trigger>,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML list of triggers.
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeError> {
        let triggers: Vec<Trigger> =
            serde_yaml::from_str(yaml).map_err(|e| RuntimeError::Config(e.to_string()))?;
        Ok(Self {
            triggers,
            handlers: HashMap::new(),
        })
    }

    pub fn on(mut self, when: TriggerCondition, action: Action) -> Self {
        self.triggers.push(Trigger { when, action });
        self
    }

    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Fire every matching trigger. Handler failures are logged and reported,
    /// never propagated.
    pub async fn dispatch(&self, result: &EvaluationResult) -> DispatchReport {
        let matched: Vec<&Trigger> = self
            .triggers
            .iter()
            .filter(|t| t.when.matches(result))
            .collect();

        let outcomes = join_all(matched.iter().map(|trigger| async move {
            let action = &trigger.action;
            let outcome = match self.handlers.get(&action.name) {
                Some(handler) => handler.handle(action, result).await,
                None => Err(ActionError::NoHandler(action.name.clone())),
            };
            (action.name.clone(), outcome)
        }))
        .await;

        let mut report = DispatchReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    tracing::debug!(criteria = %result.criteria_id, action = %name, "Action dispatched");
                    report.fired.push(name);
                }
                Err(e) => {
                    tracing::warn!(criteria = %result.criteria_id, action = %name, error = %e, "Action failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("Workflow")
            .field("triggers", &self.triggers)
            .field("handlers", &handlers)
            .finish()
    }
}
