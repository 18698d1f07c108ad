//! Comparison operators understood by rules and dependency predicates.
//!
//! Operators are written in criteria documents as strings. Both symbolic
//! (`>=`) and word (`greater_than_or_equal`, `gte`) spellings are accepted;
//! traces always show the canonical form returned by [`Operator::symbol`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a criteria document names an operator we do not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown operator '{0}'")]
pub struct UnknownOperator(pub String);

/// A comparison between an extracted field value and an expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    Between,
    NotBetween,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    Exists,
    NotExists,
}

impl Operator {
    /// Canonical spelling used in execution traces and fingerprints.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Between => "between",
            Operator::NotBetween => "not_between",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::Matches => "matches",
            Operator::Exists => "exists",
            Operator::NotExists => "not_exists",
        }
    }

    /// Operators whose expected value must be an array.
    pub fn is_multi_value(self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::Between | Operator::NotBetween
        )
    }

    /// Operators that ignore the expected value entirely.
    pub fn is_presence_check(self) -> bool {
        matches!(self, Operator::Exists | Operator::NotExists)
    }
}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let op = match normalized.as_str() {
            "==" | "=" | "eq" | "equals" | "equal" => Operator::Equals,
            "!=" | "<>" | "ne" | "neq" | "not_equals" | "not_equal" => Operator::NotEquals,
            ">" | "gt" | "greater_than" => Operator::GreaterThan,
            ">=" | "gte" | "greater_than_or_equal" => Operator::GreaterThanOrEqual,
            "<" | "lt" | "less_than" => Operator::LessThan,
            "<=" | "lte" | "less_than_or_equal" => Operator::LessThanOrEqual,
            "in" => Operator::In,
            "not_in" | "nin" => Operator::NotIn,
            "between" => Operator::Between,
            "not_between" => Operator::NotBetween,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "matches" | "regex" | "matches_regex" => Operator::Matches,
            "exists" => Operator::Exists,
            "not_exists" => Operator::NotExists,
            _ => return Err(UnknownOperator(s.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
