//! ValueComparator: one (field, operator, expected) check against a record.
//!
//! Comparison is total. An absent field, a type mismatch or a malformed
//! expected value all yield a failing [`Comparison`] that says *why*, so the
//! execution trace can tell "field missing" apart from "value mismatch".
//!
//! ## Coercion
//!
//! | Situation | Behaviour |
//! |-----------|-----------|
//! | both sides numeric-coercible | compared as `f64` (`"3000"` equals `3000`) |
//! | both sides strings | `<`/`>` compare lexicographically |
//! | anything else | strict JSON equality; ordering is a mismatch |
//! | field absent | fails with `FieldMissing`, except `not_exists` |

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::operator::{Operator, UnknownOperator};
use crate::record::Record;

lazy_static! {
    /// One or more non-empty segments separated by single dots.
    static ref FIELD_PATH: Regex = Regex::new(r"^[^.\s]+(\.[^.\s]+)*$").unwrap();
}

/// Problems with a condition definition, detected at load time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error(transparent)]
    UnknownOperator(#[from] UnknownOperator),

    #[error("invalid field path '{0}'")]
    InvalidFieldPath(String),

    #[error("operator '{0}' requires an array value")]
    ExpectedArray(Operator),

    #[error("operator '{0}' requires a scalar value, got an array")]
    ExpectedScalar(Operator),

    #[error("operator '{0}' requires a value")]
    MissingValue(Operator),

    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// A validated predicate over one field of a record.
#[derive(Debug, Clone)]
pub struct Condition {
    field: String,
    operator: Operator,
    expected: Value,
    pattern: Option<Regex>,
}

impl Condition {
    /// Validate and build a condition.
    ///
    /// Multi-value operators (`in`, `not_in`, `between`, `not_between`)
    /// need an array; every other value-taking operator needs a scalar.
    /// `matches` compiles its pattern here so a bad regex is a load error.
    pub fn new(
        field: impl Into<String>,
        operator: &str,
        expected: Value,
    ) -> Result<Self, ConditionError> {
        let field = field.into();
        if !FIELD_PATH.is_match(&field) {
            return Err(ConditionError::InvalidFieldPath(field));
        }

        let operator: Operator = operator.parse()?;

        if !operator.is_presence_check() {
            if expected.is_null() && operator != Operator::Equals && operator != Operator::NotEquals {
                return Err(ConditionError::MissingValue(operator));
            }
            if operator.is_multi_value() && !expected.is_array() {
                return Err(ConditionError::ExpectedArray(operator));
            }
            if !operator.is_multi_value() && expected.is_array() {
                return Err(ConditionError::ExpectedScalar(operator));
            }
        }

        let pattern = if operator == Operator::Matches {
            let source = match &expected {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let compiled = Regex::new(&source).map_err(|e| ConditionError::InvalidRegex {
                pattern: source.clone(),
                reason: e.to_string(),
            })?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self {
            field,
            operator,
            expected,
            pattern,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn expected(&self) -> &Value {
        &self.expected
    }

    /// Resolve this condition's field in `record` and compare.
    pub fn check(&self, record: &Record) -> (Option<Value>, Comparison) {
        let actual = record.get(&self.field);
        let comparison = ValueComparator::compare(actual, self);
        (actual.cloned(), comparison)
    }
}

/// Outcome of a single comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// The value satisfied the operator.
    Match,

    /// The field was present but did not satisfy the operator.
    Mismatch,

    /// The field path did not resolve in the record.
    FieldMissing,

    /// The rule cannot be applied as written (e.g. `between` without two bounds).
    Malformed(String),
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }

    fn from_bool(matched: bool) -> Self {
        if matched {
            Comparison::Match
        } else {
            Comparison::Mismatch
        }
    }
}

/// Stateless comparison of an actual value against a [`Condition`].
pub struct ValueComparator;

impl ValueComparator {
    /// Compare `actual` (as extracted from a record) against `condition`.
    pub fn compare(actual: Option<&Value>, condition: &Condition) -> Comparison {
        let op = condition.operator;
        let expected = &condition.expected;

        let actual = match actual {
            Some(value) => value,
            None if op == Operator::NotExists => return Comparison::Match,
            None => return Comparison::FieldMissing,
        };

        match op {
            Operator::Exists => Comparison::from_bool(!actual.is_null()),
            Operator::NotExists => Comparison::from_bool(actual.is_null()),
            Operator::Equals => Comparison::from_bool(values_equal(actual, expected)),
            Operator::NotEquals => Comparison::from_bool(!values_equal(actual, expected)),
            Operator::GreaterThan => ordered(actual, expected, |o| o.is_gt()),
            Operator::GreaterThanOrEqual => ordered(actual, expected, |o| o.is_ge()),
            Operator::LessThan => ordered(actual, expected, |o| o.is_lt()),
            Operator::LessThanOrEqual => ordered(actual, expected, |o| o.is_le()),
            Operator::In => membership(actual, expected).map_or_else(malformed, Comparison::from_bool),
            Operator::NotIn => {
                membership(actual, expected).map_or_else(malformed, |hit| Comparison::from_bool(!hit))
            }
            Operator::Between => within_range(actual, expected),
            Operator::NotBetween => match within_range(actual, expected) {
                Comparison::Match => Comparison::Mismatch,
                Comparison::Mismatch if as_number(actual).is_some() => Comparison::Match,
                other => other,
            },
            Operator::Contains => Comparison::from_bool(contains(actual, expected)),
            Operator::NotContains => Comparison::from_bool(!contains(actual, expected)),
            Operator::StartsWith => string_test(actual, expected, |a, e| a.starts_with(e)),
            Operator::EndsWith => string_test(actual, expected, |a, e| a.ends_with(e)),
            Operator::Matches => match (&condition.pattern, as_text(actual)) {
                (Some(pattern), Some(text)) => Comparison::from_bool(pattern.is_match(&text)),
                (Some(_), None) => Comparison::Mismatch,
                (None, _) => Comparison::Malformed("regular expression was not compiled".into()),
            },
        }
    }
}

fn malformed(reason: String) -> Comparison {
    Comparison::Malformed(reason)
}

/// Numbers, and strings that parse as finite numbers.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Exact integer view, so integers past 2^53 are not collapsed by `f64`.
fn as_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

fn numeric_cmp(actual: &Value, expected: &Value) -> Option<Option<std::cmp::Ordering>> {
    if let (Some(a), Some(b)) = (as_integer(actual), as_integer(expected)) {
        return Some(Some(a.cmp(&b)));
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => Some(a.partial_cmp(&b)),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match numeric_cmp(actual, expected) {
        Some(ordering) => ordering == Some(std::cmp::Ordering::Equal),
        None => actual == expected,
    }
}

fn ordered(actual: &Value, expected: &Value, test: fn(std::cmp::Ordering) -> bool) -> Comparison {
    if let Some(ordering) = numeric_cmp(actual, expected) {
        return match ordering {
            Some(ordering) => Comparison::from_bool(test(ordering)),
            None => Comparison::Mismatch,
        };
    }
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Comparison::from_bool(test(a.cmp(b))),
        _ => Comparison::Mismatch,
    }
}

/// `Ok(true)` when `actual` (or any element of an array `actual`) is in the set.
fn membership(actual: &Value, expected: &Value) -> Result<bool, String> {
    let set = expected
        .as_array()
        .ok_or_else(|| "membership operators require an array".to_string())?;
    let hit = match actual {
        Value::Array(items) => items
            .iter()
            .any(|item| set.iter().any(|candidate| values_equal(item, candidate))),
        scalar => set.iter().any(|candidate| values_equal(scalar, candidate)),
    };
    Ok(hit)
}

fn within_range(actual: &Value, expected: &Value) -> Comparison {
    let bounds = match expected.as_array() {
        Some(bounds) if bounds.len() == 2 => bounds,
        Some(bounds) => {
            return Comparison::Malformed(format!(
                "range requires exactly two bounds [min, max], got {}",
                bounds.len()
            ))
        }
        None => return Comparison::Malformed("range requires an array [min, max]".into()),
    };
    let (min, max) = match (as_number(&bounds[0]), as_number(&bounds[1])) {
        (Some(min), Some(max)) => (min, max),
        _ => return Comparison::Malformed("range bounds must be numeric".into()),
    };
    match as_number(actual) {
        Some(value) => Comparison::from_bool(value >= min && value <= max),
        None => Comparison::Mismatch,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(haystack) => match as_text(expected) {
            Some(needle) => haystack.contains(&needle),
            None => false,
        },
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        Value::Object(object) => expected
            .as_str()
            .map(|key| object.contains_key(key))
            .unwrap_or(false),
        _ => false,
    }
}

fn string_test(actual: &Value, expected: &Value, test: fn(&str, &str) -> bool) -> Comparison {
    match (actual.as_str(), as_text(expected)) {
        (Some(a), Some(e)) => Comparison::from_bool(test(a, &e)),
        _ => Comparison::Mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(actual: Value, op: &str, expected: Value) -> Comparison {
        let condition = Condition::new("f", op, expected).unwrap();
        ValueComparator::compare(Some(&actual), &condition)
    }

    fn absent(op: &str, expected: Value) -> Comparison {
        let condition = Condition::new("f", op, expected).unwrap();
        ValueComparator::compare(None, &condition)
    }

    #[test]
    fn test_numeric_ordering() {
        assert_eq!(check(json!(5000), ">=", json!(3000)), Comparison::Match);
        assert_eq!(check(json!(2000), ">=", json!(3000)), Comparison::Mismatch);
        assert_eq!(check(json!(0.25), "<=", json!(0.3)), Comparison::Match);
        assert_eq!(check(json!(3), "<", json!(3)), Comparison::Mismatch);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        assert_eq!(check(json!("5000"), ">", json!(3000)), Comparison::Match);
        assert_eq!(check(json!("1.0"), "==", json!(1)), Comparison::Match);
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        assert_eq!(
            check(json!(9007199254740993u64), "==", json!(9007199254740992u64)),
            Comparison::Mismatch
        );
        assert_eq!(
            check(json!(9007199254740993u64), ">", json!(9007199254740992u64)),
            Comparison::Match
        );
        assert_eq!(
            check(json!("9007199254740993"), "!=", json!(9007199254740992u64)),
            Comparison::Match
        );
        assert_eq!(check(json!(u64::MAX), ">", json!(-1)), Comparison::Match);
        assert_eq!(check(json!(3), "==", json!(3.0)), Comparison::Match);
    }

    #[test]
    fn test_strict_equality_for_non_numeric() {
        assert_eq!(check(json!(true), "==", json!(true)), Comparison::Match);
        assert_eq!(check(json!("true"), "==", json!(true)), Comparison::Mismatch);
        assert_eq!(check(json!("gold"), "!=", json!("silver")), Comparison::Match);
    }

    #[test]
    fn test_string_ordering_is_lexicographic() {
        assert_eq!(check(json!("b"), ">", json!("a")), Comparison::Match);
        assert_eq!(check(json!("abc"), ">", json!(10)), Comparison::Mismatch);
    }

    #[test]
    fn test_absent_field_fails_distinctly() {
        assert_eq!(absent(">=", json!(1)), Comparison::FieldMissing);
        // Absence is not a free pass for inequality.
        assert_eq!(absent("!=", json!("x")), Comparison::FieldMissing);
        assert_eq!(absent("not_exists", Value::Null), Comparison::Match);
        assert_eq!(absent("exists", Value::Null), Comparison::FieldMissing);
    }

    #[test]
    fn test_membership() {
        assert_eq!(check(json!("US"), "in", json!(["US", "CA"])), Comparison::Match);
        assert_eq!(check(json!("MX"), "in", json!(["US", "CA"])), Comparison::Mismatch);
        assert_eq!(check(json!("MX"), "not_in", json!(["US", "CA"])), Comparison::Match);
        assert_eq!(check(json!(2), "in", json!([1, 2, 3])), Comparison::Match);
        assert_eq!(check(json!(["a", "z"]), "in", json!(["z"])), Comparison::Match);
    }

    #[test]
    fn test_between_inclusive() {
        assert_eq!(check(json!(18), "between", json!([18, 65])), Comparison::Match);
        assert_eq!(check(json!(65), "between", json!([18, 65])), Comparison::Match);
        assert_eq!(check(json!(70), "between", json!([18, 65])), Comparison::Mismatch);
        assert_eq!(check(json!(70), "not_between", json!([18, 65])), Comparison::Match);
        assert_eq!(check(json!(30), "not_between", json!([18, 65])), Comparison::Mismatch);
    }

    #[test]
    fn test_between_with_wrong_arity_is_malformed() {
        assert!(matches!(
            check(json!(5), "between", json!([1, 2, 3])),
            Comparison::Malformed(_)
        ));
        assert!(matches!(
            check(json!(5), "not_between", json!(["a", 2])),
            Comparison::Malformed(_)
        ));
    }

    #[test]
    fn test_contains_and_affixes() {
        assert_eq!(check(json!("premium plan"), "contains", json!("plan")), Comparison::Match);
        assert_eq!(check(json!(["a", "b"]), "contains", json!("b")), Comparison::Match);
        assert_eq!(check(json!(["a", "b"]), "not_contains", json!("c")), Comparison::Match);
        assert_eq!(check(json!("ACME-42"), "starts_with", json!("ACME")), Comparison::Match);
        assert_eq!(check(json!("ACME-42"), "ends_with", json!("43")), Comparison::Mismatch);
    }

    #[test]
    fn test_regex() {
        assert_eq!(
            check(json!("user@example.com"), "matches", json!(r"^[^@]+@example\.com$")),
            Comparison::Match
        );
        assert_eq!(check(json!(12345), "regex", json!(r"^\d{5}$")), Comparison::Match);
        assert_eq!(check(json!(null), "matches", json!("x")), Comparison::Mismatch);
    }

    #[test]
    fn test_load_time_validation() {
        assert!(matches!(
            Condition::new("age", "approximately", json!(1)),
            Err(ConditionError::UnknownOperator(_))
        ));
        assert!(matches!(
            Condition::new("age", "in", json!(3)),
            Err(ConditionError::ExpectedArray(Operator::In))
        ));
        assert!(matches!(
            Condition::new("age", ">=", json!([1, 2])),
            Err(ConditionError::ExpectedScalar(Operator::GreaterThanOrEqual))
        ));
        assert!(matches!(
            Condition::new("name", "matches", json!("(unclosed")),
            Err(ConditionError::InvalidRegex { .. })
        ));
        assert!(matches!(
            Condition::new("a..b", "==", json!(1)),
            Err(ConditionError::InvalidFieldPath(_))
        ));
        assert!(matches!(
            Condition::new("age", ">", Value::Null),
            Err(ConditionError::MissingValue(_))
        ));
    }
}
