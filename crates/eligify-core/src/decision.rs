//! DecisionResolver: map a score onto a named band.
//!
//! Bands are `(min_score, label)` pairs. The band with the highest
//! `min_score` that is still `<= score` wins; equal minimums resolve to the
//! first declared. When nothing matches (no `0` band) the resolver falls back
//! to its default label.

use serde::{Deserialize, Serialize};

/// Label used when no band matches and the criteria names no default.
pub const DEFAULT_DECISION: &str = "Under Review";

/// One decision band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionThreshold {
    pub min_score: f64,
    pub label: String,
}

impl DecisionThreshold {
    pub fn new(min_score: f64, label: impl Into<String>) -> Self {
        Self {
            min_score,
            label: label.into(),
        }
    }
}

/// Resolves scores to decision labels.
#[derive(Debug, Clone)]
pub struct DecisionResolver {
    default_label: String,
}

impl DecisionResolver {
    pub fn new(default_label: impl Into<String>) -> Self {
        Self {
            default_label: default_label.into(),
        }
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Pick the label for `score`. Order of `thresholds` does not matter.
    pub fn resolve(&self, score: f64, thresholds: &[DecisionThreshold]) -> String {
        self.resolve_or(score, thresholds, &self.default_label)
    }

    /// As [`resolve`](Self::resolve) with an explicit fallback label.
    pub fn resolve_or(&self, score: f64, thresholds: &[DecisionThreshold], fallback: &str) -> String {
        let mut best: Option<&DecisionThreshold> = None;
        for band in thresholds.iter().filter(|band| band.min_score <= score) {
            match best {
                Some(current) if band.min_score <= current.min_score => {}
                _ => best = Some(band),
            }
        }
        best.map(|band| band.label.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl Default for DecisionResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DECISION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> Vec<DecisionThreshold> {
        vec![
            DecisionThreshold::new(0.0, "rejected"),
            DecisionThreshold::new(90.0, "approved"),
            DecisionThreshold::new(60.0, "review"),
        ]
    }

    #[test]
    fn test_highest_band_not_above_score_wins() {
        let resolver = DecisionResolver::default();
        assert_eq!(resolver.resolve(75.0, &bands()), "review");
        assert_eq!(resolver.resolve(90.0, &bands()), "approved");
        assert_eq!(resolver.resolve(100.0, &bands()), "approved");
        assert_eq!(resolver.resolve(59.99, &bands()), "rejected");
    }

    #[test]
    fn test_falls_back_when_no_band_matches() {
        let resolver = DecisionResolver::default();
        let bands = vec![DecisionThreshold::new(50.0, "ok")];
        assert_eq!(resolver.resolve(10.0, &bands), DEFAULT_DECISION);
        assert_eq!(resolver.resolve(10.0, &[]), DEFAULT_DECISION);
        assert_eq!(resolver.resolve_or(10.0, &bands, "manual"), "manual");
    }

    #[test]
    fn test_equal_minimums_keep_declaration_order() {
        let resolver = DecisionResolver::default();
        let bands = vec![
            DecisionThreshold::new(50.0, "first"),
            DecisionThreshold::new(50.0, "second"),
        ];
        assert_eq!(resolver.resolve(70.0, &bands), "first");
    }
}
