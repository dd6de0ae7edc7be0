//! Condition operators and their predicates
//!
//! Operators form a closed set. Each operator name maps to exactly one
//! predicate through [`OPERATORS`]; a name that is not in the table is a
//! validation error, never a silent match or mismatch.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::cidr::Cidr;
use crate::error::{AuthzError, Result};
use crate::pattern::Pattern;

/// Supported condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    StringEquals,
    StringNotEquals,
    /// Glob match, `*` wildcard
    StringLike,
    NumericEquals,
    NumericLessThan,
    NumericLessThanEquals,
    NumericGreaterThan,
    NumericGreaterThanEquals,
    DateLessThan,
    DateGreaterThan,
    Bool,
    /// Context address inside a listed CIDR block
    IpAddress,
    /// Context address inside none of the listed CIDR blocks
    NotIpAddress,
}

/// Operator name registry
pub const OPERATORS: &[(&str, ConditionOperator)] = &[
    ("StringEquals", ConditionOperator::StringEquals),
    ("StringNotEquals", ConditionOperator::StringNotEquals),
    ("StringLike", ConditionOperator::StringLike),
    ("NumericEquals", ConditionOperator::NumericEquals),
    ("NumericLessThan", ConditionOperator::NumericLessThan),
    ("NumericLessThanEquals", ConditionOperator::NumericLessThanEquals),
    ("NumericGreaterThan", ConditionOperator::NumericGreaterThan),
    ("NumericGreaterThanEquals", ConditionOperator::NumericGreaterThanEquals),
    ("DateLessThan", ConditionOperator::DateLessThan),
    ("DateGreaterThan", ConditionOperator::DateGreaterThan),
    ("Bool", ConditionOperator::Bool),
    ("IpAddress", ConditionOperator::IpAddress),
    ("NotIpAddress", ConditionOperator::NotIpAddress),
];

/// A condition value, parsed for its operator at load time
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Text(String),
    Glob(Pattern),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Flag(bool),
    Network(Cidr),
}

/// Positive-form predicate: `actual` (from the context) against one value.
///
/// `None` means the context value could not be read for this operator; the
/// caller treats that as a failed condition regardless of negation.
pub type Predicate = fn(&str, &ConditionValue) -> Option<bool>;

impl ConditionOperator {
    /// Look up an operator by its policy-document name
    pub fn from_name(name: &str) -> Option<Self> {
        OPERATORS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, op)| *op)
    }

    /// The policy-document name of this operator
    pub fn name(self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(n, _)| *n)
            .unwrap_or("Unknown")
    }

    /// Negated operators hold when no listed value matches
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            ConditionOperator::StringNotEquals | ConditionOperator::NotIpAddress
        )
    }

    /// Predicate evaluated for each listed value (before negation)
    pub fn predicate(self) -> Predicate {
        use ConditionOperator::*;

        match self {
            StringEquals | StringNotEquals => string_equals,
            StringLike => string_like,
            NumericEquals => numeric_equals,
            NumericLessThan => numeric_less_than,
            NumericLessThanEquals => numeric_less_than_equals,
            NumericGreaterThan => numeric_greater_than,
            NumericGreaterThanEquals => numeric_greater_than_equals,
            DateLessThan => date_less_than,
            DateGreaterThan => date_greater_than,
            Bool => bool_equals,
            IpAddress | NotIpAddress => ip_in_network,
        }
    }

    /// Parse a raw value from a policy document for this operator
    pub fn parse_value(self, raw: &str) -> Result<ConditionValue> {
        use ConditionOperator::*;

        let invalid = |what: &str| {
            AuthzError::Validation(format!(
                "{} expects {}, got '{}'",
                self.name(),
                what,
                raw
            ))
        };

        match self {
            StringEquals | StringNotEquals => Ok(ConditionValue::Text(raw.to_string())),
            StringLike => Ok(ConditionValue::Glob(Pattern::compile(raw))),
            NumericEquals | NumericLessThan | NumericLessThanEquals | NumericGreaterThan
            | NumericGreaterThanEquals => parse_number(raw)
                .map(ConditionValue::Number)
                .ok_or_else(|| invalid("a number")),
            DateLessThan | DateGreaterThan => parse_timestamp(raw)
                .map(ConditionValue::Timestamp)
                .ok_or_else(|| invalid("an RFC 3339 timestamp or epoch seconds")),
            Bool => parse_bool(raw)
                .map(ConditionValue::Flag)
                .ok_or_else(|| invalid("true or false")),
            IpAddress | NotIpAddress => Cidr::from_str(raw)
                .map(ConditionValue::Network)
                .map_err(|e| invalid(&format!("a CIDR block ({})", e))),
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
            .ok_or_else(|| AuthzError::Validation(format!("Unsupported condition operator: {}", s)))
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn string_equals(actual: &str, expected: &ConditionValue) -> Option<bool> {
    match expected {
        ConditionValue::Text(e) => Some(actual == e),
        _ => None,
    }
}

fn string_like(actual: &str, expected: &ConditionValue) -> Option<bool> {
    match expected {
        ConditionValue::Glob(pattern) => Some(pattern.matches(actual)),
        _ => None,
    }
}

fn compare_numbers(actual: &str, expected: &ConditionValue, cmp: fn(f64, f64) -> bool) -> Option<bool> {
    match expected {
        ConditionValue::Number(e) => parse_number(actual).map(|a| cmp(a, *e)),
        _ => None,
    }
}

fn numeric_equals(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_numbers(actual, expected, |a, e| a == e)
}

fn numeric_less_than(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_numbers(actual, expected, |a, e| a < e)
}

fn numeric_less_than_equals(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_numbers(actual, expected, |a, e| a <= e)
}

fn numeric_greater_than(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_numbers(actual, expected, |a, e| a > e)
}

fn numeric_greater_than_equals(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_numbers(actual, expected, |a, e| a >= e)
}

fn compare_dates(
    actual: &str,
    expected: &ConditionValue,
    cmp: fn(&DateTime<Utc>, &DateTime<Utc>) -> bool,
) -> Option<bool> {
    match expected {
        ConditionValue::Timestamp(e) => parse_timestamp(actual).map(|a| cmp(&a, e)),
        _ => None,
    }
}

fn date_less_than(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_dates(actual, expected, |a, e| a < e)
}

fn date_greater_than(actual: &str, expected: &ConditionValue) -> Option<bool> {
    compare_dates(actual, expected, |a, e| a > e)
}

fn bool_equals(actual: &str, expected: &ConditionValue) -> Option<bool> {
    match expected {
        ConditionValue::Flag(e) => parse_bool(actual).map(|a| a == *e),
        _ => None,
    }
}

fn ip_in_network(actual: &str, expected: &ConditionValue) -> Option<bool> {
    match expected {
        ConditionValue::Network(block) => actual
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|ip| block.contains(ip)),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// RFC 3339, plain `YYYY-MM-DD` (midnight UTC) or integer epoch seconds
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight));
    }

    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
