//! ScoringEngine: aggregate unit outcomes into one number.
//!
//! A "unit" is whatever the criteria scores: individual rules for flat
//! criteria, top-level groups for grouped criteria. Skipped units are left
//! out of numerator and denominator alike, for every method.
//!
//! | Method | Score |
//! |--------|-------|
//! | `weighted` | `100 * Σ(passed·weight) / Σ(weight)`; 100 when total weight is 0 |
//! | `pass_fail` | 100 if every unit passed, else 0 |
//! | `sum` | raw `Σ(passed·weight)`, not normalised |
//! | `average` | `100 * passed / total`; 100 when there are no units |
//! | `percentage` | same as `average` |

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a criteria turns outcomes into a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    #[default]
    #[serde(alias = "weighted_average")]
    Weighted,
    #[serde(alias = "passfail", alias = "binary")]
    PassFail,
    Sum,
    Average,
    Percentage,
}

impl ScoringMethod {
    /// Whether scores are confined to 0–100.
    pub fn is_normalized(self) -> bool {
        !matches!(self, ScoringMethod::Sum)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoringMethod::Weighted => "weighted",
            ScoringMethod::PassFail => "pass_fail",
            ScoringMethod::Sum => "sum",
            ScoringMethod::Average => "average",
            ScoringMethod::Percentage => "percentage",
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of an outcome the scoring engine needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreUnit {
    pub passed: bool,
    pub weight: f64,
    pub skipped: bool,
}

impl ScoreUnit {
    pub fn new(passed: bool, weight: f64) -> Self {
        Self {
            passed,
            weight,
            skipped: false,
        }
    }

    pub fn skipped(weight: f64) -> Self {
        Self {
            passed: true,
            weight,
            skipped: true,
        }
    }
}

/// Stateless scorer.
#[derive(Debug, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score `units` with `method`. Results are rounded to two decimals.
    pub fn score(&self, units: &[ScoreUnit], method: ScoringMethod) -> f64 {
        let considered: Vec<&ScoreUnit> = units.iter().filter(|u| !u.skipped).collect();
        let passed_weight: f64 = considered
            .iter()
            .filter(|u| u.passed)
            .map(|u| u.weight)
            .sum();

        let raw = match method {
            ScoringMethod::Weighted => {
                let total_weight: f64 = considered.iter().map(|u| u.weight).sum();
                if total_weight > 0.0 {
                    100.0 * passed_weight / total_weight
                } else {
                    100.0
                }
            }
            ScoringMethod::PassFail => {
                if considered.iter().all(|u| u.passed) {
                    100.0
                } else {
                    0.0
                }
            }
            ScoringMethod::Sum => passed_weight,
            ScoringMethod::Average | ScoringMethod::Percentage => {
                if considered.is_empty() {
                    100.0
                } else {
                    let passed = considered.iter().filter(|u| u.passed).count();
                    100.0 * passed as f64 / considered.len() as f64
                }
            }
        };

        let bounded = if method.is_normalized() {
            raw.clamp(0.0, 100.0)
        } else {
            raw.max(0.0)
        };
        round2(bounded)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
