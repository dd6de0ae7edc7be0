//! Policy statements: wire form, compiled form and the applicability check

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::{ConditionBlock, Conditions};
use crate::error::{AuthzError, Result};
use crate::pattern::{matches_any, Pattern};
use crate::types::{EvaluationContext, OneOrMany};

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Permit matching requests
    Allow,
    /// Forbid matching requests (takes precedence over Allow)
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("Allow"),
            Effect::Deny => f.write_str("Deny"),
        }
    }
}

/// A statement exactly as it appears in a policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatementDocument {
    /// Optional statement id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Allow or Deny
    pub effect: Effect,

    /// Action patterns
    pub action: OneOrMany<String>,

    /// Resource patterns
    pub resource: OneOrMany<String>,

    /// Optional condition block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionBlock>,
}

impl StatementDocument {
    /// Unconditional statement
    pub fn new(effect: Effect, actions: Vec<String>, resources: Vec<String>) -> Self {
        Self {
            sid: None,
            effect,
            action: actions.into(),
            resource: resources.into(),
            condition: None,
        }
    }

    /// Attach a statement id
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Attach a condition block
    pub fn with_condition(mut self, condition: ConditionBlock) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A validated statement with pre-compiled patterns and conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    effect: Effect,
    actions: Vec<Pattern>,
    resources: Vec<Pattern>,
    conditions: Option<Conditions>,
    source: StatementDocument,
}

impl Statement {
    /// Validate and compile a statement
    ///
    /// Fails when the action or resource list is empty, a pattern cannot be
    /// compiled or the condition block is malformed.
    pub fn compile(source: StatementDocument) -> Result<Self> {
        let label = source.sid.as_deref().unwrap_or("<unnamed>");

        if source.action.is_empty() {
            return Err(AuthzError::Validation(format!(
                "Statement {} has no actions",
                label
            )));
        }

        if source.resource.is_empty() {
            return Err(AuthzError::Validation(format!(
                "Statement {} has no resources",
                label
            )));
        }

        let actions: Vec<Pattern> = source.action.as_slice().iter().map(Pattern::compile).collect();
        let resources: Vec<Pattern> = source.resource.as_slice().iter().map(Pattern::compile).collect();

        // An uncompilable pattern never matches; on a Deny that would fail open
        if let Some(pattern) = actions.iter().chain(&resources).find(|p| !p.is_compiled()) {
            return Err(AuthzError::Validation(format!(
                "Statement {} has a pattern that is too large to compile ({} bytes)",
                label,
                pattern.as_str().len()
            )));
        }

        let conditions = match &source.condition {
            Some(block) => {
                let compiled = Conditions::compile(block).map_err(|e| {
                    AuthzError::Validation(format!("Statement {}: {}", label, e))
                })?;
                // `{}` is the same as no condition block
                Some(compiled).filter(|c| !c.is_empty())
            }
            None => None,
        };

        Ok(Self {
            effect: source.effect,
            actions,
            resources,
            conditions,
            source,
        })
    }

    /// Whether this statement applies to the request
    ///
    /// Requires an action match, a resource match and (when present) the
    /// conditions to hold. Cheapest checks run first.
    pub fn applies(&self, action: &str, resource: &str, context: &EvaluationContext) -> bool {
        matches_any(&self.actions, action)
            && matches_any(&self.resources, resource)
            && self
                .conditions
                .as_ref()
                .map_or(true, |conditions| conditions.evaluate(context))
    }

    /// Statement effect
    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Statement id, if any
    pub fn sid(&self) -> Option<&str> {
        self.source.sid.as_deref()
    }

    /// Compiled action patterns
    pub fn actions(&self) -> &[Pattern] {
        &self.actions
    }

    /// Compiled resource patterns
    pub fn resources(&self) -> &[Pattern] {
        &self.resources
    }

    /// Compiled conditions, `None` when unconditional
    pub fn conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }

    /// The statement as written
    pub fn source(&self) -> &StatementDocument {
        &self.source
    }
}
