//! Decisions and the deny-overrides reduction

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::aggregator::CollectedStatement;
use crate::statement::{Effect, StatementDocument};
use crate::types::{EvaluationContext, PolicyId, RoleId};

/// Final outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Allow,
    Deny,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Allow => f.write_str("Allow"),
            Outcome::Deny => f.write_str("Deny"),
        }
    }
}

/// Why the outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionReason {
    /// An applicable Deny statement
    ExplicitDeny,
    /// An applicable Allow statement and no applicable Deny
    ExplicitAllow,
    /// No applicable statement at all
    ImplicitDeny,
    /// The principal is unknown to the registry
    NoApplicablePrincipalData,
}

/// The statement that determined a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedStatement {
    /// Policy holding the statement
    pub policy_id: PolicyId,

    /// Role the policy was reached through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,

    /// Index of the statement within its policy
    pub statement_index: usize,

    /// The statement as written
    pub statement: StatementDocument,
}

impl From<&CollectedStatement> for MatchedStatement {
    fn from(collected: &CollectedStatement) -> Self {
        Self {
            policy_id: collected.policy_id.clone(),
            role_id: collected.role_id.clone(),
            statement_index: collected.index,
            statement: collected.statement().source().clone(),
        }
    }
}

/// Authorization decision with its justification
///
/// Contains no timestamps or ids, so evaluating the same request against the
/// same data always produces an equal `Decision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub reason: DecisionReason,
    pub matched_statement: Option<MatchedStatement>,
}

impl Decision {
    /// Deny for a principal the registry does not know
    pub fn no_principal_data() -> Self {
        Self {
            outcome: Outcome::Deny,
            reason: DecisionReason::NoApplicablePrincipalData,
            matched_statement: None,
        }
    }

    /// Deny because nothing applied
    pub fn implicit_deny() -> Self {
        Self {
            outcome: Outcome::Deny,
            reason: DecisionReason::ImplicitDeny,
            matched_statement: None,
        }
    }

    fn explicit(effect: Effect, matched: &CollectedStatement) -> Self {
        let (outcome, reason) = match effect {
            Effect::Deny => (Outcome::Deny, DecisionReason::ExplicitDeny),
            Effect::Allow => (Outcome::Allow, DecisionReason::ExplicitAllow),
        };

        Self {
            outcome,
            reason,
            matched_statement: Some(matched.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    /// Human-readable justification
    pub fn explanation(&self) -> String {
        let source = self.matched_statement.as_ref().map(|m| {
            let sid = m
                .statement
                .sid
                .as_deref()
                .map(|sid| format!(" ({})", sid))
                .unwrap_or_default();
            let via = m
                .role_id
                .as_deref()
                .map(|role| format!(" via role '{}'", role))
                .unwrap_or_default();
            format!(
                "statement {}{} of policy '{}'{}",
                m.statement_index, sid, m.policy_id, via
            )
        });

        match (self.reason, source) {
            (DecisionReason::ExplicitDeny, Some(source)) => {
                format!("Denied explicitly by {}", source)
            }
            (DecisionReason::ExplicitAllow, Some(source)) => {
                format!("Allowed by {}", source)
            }
            (DecisionReason::NoApplicablePrincipalData, _) => {
                "Denied: principal is unknown to the registry".to_string()
            }
            _ => "Denied implicitly: no statement allows this request".to_string(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.outcome, self.explanation())
    }
}

/// Reduce collected statements to a decision
///
/// Explicit deny overrides explicit allow, which overrides the implicit
/// deny. The first applicable statement of the winning effect, in
/// aggregation order, is reported.
pub fn decide(
    statements: &[CollectedStatement],
    action: &str,
    resource: &str,
    context: &EvaluationContext,
) -> Decision {
    let mut first_allow: Option<&CollectedStatement> = None;

    for collected in statements {
        let statement = collected.statement();
        if !statement.applies(action, resource, context) {
            continue;
        }

        trace!(
            "Statement {} of '{}' applies ({})",
            collected.index,
            collected.policy_id,
            statement.effect()
        );

        match statement.effect() {
            Effect::Deny => return Decision::explicit(Effect::Deny, collected),
            Effect::Allow => {
                first_allow.get_or_insert(collected);
            }
        }
    }

    match first_allow {
        Some(allow) => Decision::explicit(Effect::Allow, allow),
        None => Decision::implicit_deny(),
    }
}
