//! Condition evaluation over the request context
//!
//! A condition block maps operators to keys to values:
//!
//! ```json
//! { "NotIpAddress": { "sourceIp": ["10.0.0.0/8"] },
//!   "StringEquals": { "department": ["eng", "ops"] } }
//! ```
//!
//! Every (operator, key) clause must hold (AND); within a clause any listed
//! value may satisfy it (OR), except for negated operators which require
//! that no value matches. A key missing from the context fails its clause.

mod cidr;
mod operator;

pub use cidr::Cidr;
pub use operator::{parse_timestamp, ConditionOperator, ConditionValue, Predicate, OPERATORS};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

use crate::error::{AuthzError, Result};
use crate::types::{EvaluationContext, OneOrMany};

/// A scalar condition value as written in a policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionScalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl fmt::Display for ConditionScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionScalar::Text(s) => f.write_str(s),
            ConditionScalar::Number(n) => write!(f, "{}", n),
            ConditionScalar::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Wire form of a statement's `Condition` block
pub type ConditionBlock = BTreeMap<String, BTreeMap<String, OneOrMany<ConditionScalar>>>;

/// One (operator, key) clause with its parsed values
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionClause {
    pub operator: ConditionOperator,
    pub key: String,
    pub values: Vec<ConditionValue>,
}

impl ConditionClause {
    /// Evaluate this clause; fail-closed on a missing or unreadable value
    pub fn evaluate(&self, context: &EvaluationContext) -> bool {
        let Some(actual) = context.get(&self.key) else {
            trace!("Condition key '{}' absent from context", self.key);
            return false;
        };

        let predicate = self.operator.predicate();
        let mut any_match = false;

        for expected in &self.values {
            match predicate(actual, expected) {
                Some(true) => {
                    any_match = true;
                    break;
                }
                Some(false) => {}
                None => {
                    trace!(
                        "Context value '{}' for key '{}' unreadable by {}",
                        actual,
                        self.key,
                        self.operator
                    );
                    return false;
                }
            }
        }

        if self.operator.is_negated() {
            !any_match
        } else {
            any_match
        }
    }
}

/// Compiled condition block of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    clauses: Vec<ConditionClause>,
}

impl Conditions {
    /// Parse and validate a condition block
    ///
    /// Rejects unknown operators, empty key maps, keys with no values and
    /// values that do not parse for their operator.
    pub fn compile(block: &ConditionBlock) -> Result<Self> {
        let mut clauses = Vec::new();

        for (operator_name, keys) in block {
            let operator: ConditionOperator = operator_name.parse()?;

            if keys.is_empty() {
                return Err(AuthzError::Validation(format!(
                    "Condition operator {} has no keys",
                    operator
                )));
            }

            for (key, raw_values) in keys {
                if raw_values.is_empty() {
                    return Err(AuthzError::Validation(format!(
                        "Condition {} on key '{}' has no values",
                        operator, key
                    )));
                }

                let values = raw_values
                    .as_slice()
                    .iter()
                    .map(|raw| operator.parse_value(&raw.to_string()))
                    .collect::<Result<Vec<_>>>()?;

                clauses.push(ConditionClause {
                    operator,
                    key: key.clone(),
                    values,
                });
            }
        }

        Ok(Self { clauses })
    }

    /// Whether every clause holds for the context
    ///
    /// An empty block always holds.
    pub fn evaluate(&self, context: &EvaluationContext) -> bool {
        self.clauses.iter().all(|clause| clause.evaluate(context))
    }

    /// Compiled clauses
    pub fn clauses(&self) -> &[ConditionClause] {
        &self.clauses
    }

    /// Whether the block has no clauses
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: serde_json::Value) -> Result<Conditions> {
        let block: ConditionBlock = serde_json::from_value(value).unwrap();
        Conditions::compile(&block)
    }

    fn ctx(pairs: &[(&str, &str)]) -> EvaluationContext {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_ip_address() {
        let conditions = compile(json!({ "IpAddress": { "sourceIp": ["10.0.0.0/8", "192.168.0.0/16"] } })).unwrap();

        assert!(conditions.evaluate(&ctx(&[("sourceIp", "10.1.2.3")])));
        assert!(conditions.evaluate(&ctx(&[("sourceIp", "192.168.4.4")])));
        assert!(!conditions.evaluate(&ctx(&[("sourceIp", "203.0.113.5")])));
    }

    #[test]
    fn test_not_ip_address() {
        let conditions = compile(json!({ "NotIpAddress": { "sourceIp": ["10.0.0.0/8"] } })).unwrap();

        assert!(conditions.evaluate(&ctx(&[("sourceIp", "203.0.113.5")])));
        assert!(!conditions.evaluate(&ctx(&[("sourceIp", "10.1.2.3")])));
    }

    #[test]
    fn test_not_ip_address_requires_no_listed_block_to_match() {
        let conditions = compile(json!({ "NotIpAddress": { "sourceIp": ["10.0.0.0/8", "192.168.0.0/16"] } })).unwrap();

        assert!(!conditions.evaluate(&ctx(&[("sourceIp", "10.1.2.3")])));
        assert!(!conditions.evaluate(&ctx(&[("sourceIp", "192.168.1.1")])));
        assert!(conditions.evaluate(&ctx(&[("sourceIp", "8.8.8.8")])));
    }

    #[test]
    fn test_missing_key_fails_closed() {
        let positive = compile(json!({ "IpAddress": { "sourceIp": "10.0.0.0/8" } })).unwrap();
        let negated = compile(json!({ "NotIpAddress": { "sourceIp": "10.0.0.0/8" } })).unwrap();
        let not_equals = compile(json!({ "StringNotEquals": { "tier": "free" } })).unwrap();

        let empty = EvaluationContext::new();
        assert!(!positive.evaluate(&empty));
        assert!(!negated.evaluate(&empty));
        assert!(!not_equals.evaluate(&empty));
    }

    #[test]
    fn test_unreadable_context_value_fails_closed() {
        let negated = compile(json!({ "NotIpAddress": { "sourceIp": "10.0.0.0/8" } })).unwrap();
        assert!(!negated.evaluate(&ctx(&[("sourceIp", "not-an-ip")])));

        let before = compile(json!({ "DateLessThan": { "requestTime": "2030-01-01T00:00:00Z" } })).unwrap();
        assert!(!before.evaluate(&ctx(&[("requestTime", "soon")])));
    }

    #[test]
    fn test_string_operators() {
        let equals = compile(json!({ "StringEquals": { "department": ["eng", "ops"] } })).unwrap();
        assert!(equals.evaluate(&ctx(&[("department", "ops")])));
        assert!(!equals.evaluate(&ctx(&[("department", "Eng")])));

        let not_equals = compile(json!({ "StringNotEquals": { "department": ["eng", "ops"] } })).unwrap();
        assert!(not_equals.evaluate(&ctx(&[("department", "sales")])));
        assert!(!not_equals.evaluate(&ctx(&[("department", "eng")])));

        let like = compile(json!({ "StringLike": { "email": "*@example.com" } })).unwrap();
        assert!(like.evaluate(&ctx(&[("email", "alice@example.com")])));
        assert!(!like.evaluate(&ctx(&[("email", "alice@example.org")])));
    }

    #[test]
    fn test_date_operators() {
        let window = compile(json!({
            "DateGreaterThan": { "requestTime": "2024-01-01T00:00:00Z" },
            "DateLessThan": { "requestTime": "2024-12-31T23:59:59Z" }
        }))
        .unwrap();

        assert!(window.evaluate(&ctx(&[("requestTime", "2024-06-15T12:00:00Z")])));
        assert!(!window.evaluate(&ctx(&[("requestTime", "2025-01-02T00:00:00Z")])));
        assert!(!window.evaluate(&ctx(&[("requestTime", "2023-12-31T00:00:00Z")])));
    }

    #[test]
    fn test_numeric_and_bool_operators() {
        let conditions = compile(json!({
            "NumericLessThan": { "objectSize": 1048576 },
            "Bool": { "mfaPresent": true }
        }))
        .unwrap();

        assert!(conditions.evaluate(&ctx(&[("objectSize", "1024"), ("mfaPresent", "true")])));
        assert!(!conditions.evaluate(&ctx(&[("objectSize", "2097152"), ("mfaPresent", "true")])));
        assert!(!conditions.evaluate(&ctx(&[("objectSize", "1024"), ("mfaPresent", "false")])));
    }

    #[test]
    fn test_prefixed_keys_resolve_bare_context_names() {
        let conditions = compile(json!({ "IpAddress": { "aws:SourceIp": "10.0.0.0/8" } })).unwrap();
        assert!(conditions.evaluate(&ctx(&[("SourceIp", "10.9.9.9")])));
    }

    #[test]
    fn test_empty_block_always_holds() {
        let conditions = compile(json!({})).unwrap();
        assert!(conditions.is_empty());
        assert!(conditions.evaluate(&EvaluationContext::new()));
    }

    #[test]
    fn test_validation_errors() {
        assert!(compile(json!({ "StringEqualsIgnoreCase": { "a": "b" } })).is_err());
        assert!(compile(json!({ "StringEquals": {} })).is_err());
        assert!(compile(json!({ "StringEquals": { "a": [] } })).is_err());
        assert!(compile(json!({ "IpAddress": { "sourceIp": "10.0.0.0/40" } })).is_err());
        assert!(compile(json!({ "NumericEquals": { "n": "many" } })).is_err());
    }
}
