//! Policy aggregation
//!
//! Gathers every statement reachable from a principal: user → role bindings
//! in scope → attached policy documents → statements.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthzError, Result};
use crate::policy::PolicyDocument;
use crate::registry::{AttachedPolicy, Registry};
use crate::statement::Statement;
use crate::types::{PolicyId, Principal, RoleId};

/// A statement together with where it came from
#[derive(Debug, Clone)]
pub struct CollectedStatement {
    /// Role through which the policy was reached; `None` for documents
    /// evaluated directly
    pub role_id: Option<RoleId>,

    /// Policy that holds the statement
    pub policy_id: PolicyId,

    /// Position of the statement inside the policy document
    pub index: usize,

    document: Arc<PolicyDocument>,
}

impl CollectedStatement {
    /// Collect the statements of one document
    pub fn from_document(
        role_id: Option<RoleId>,
        policy_id: impl Into<PolicyId>,
        document: Arc<PolicyDocument>,
    ) -> Vec<Self> {
        let policy_id = policy_id.into();

        (0..document.statements().len())
            .map(|index| Self {
                role_id: role_id.clone(),
                policy_id: policy_id.clone(),
                index,
                document: document.clone(),
            })
            .collect()
    }

    /// The compiled statement
    pub fn statement(&self) -> &Statement {
        &self.document.statements()[self.index]
    }
}

/// Outcome of statement collection
#[derive(Debug, Clone)]
pub enum Aggregation {
    /// The registry has no record of the user
    UnknownPrincipal,

    /// The principal is known; `statements` may be empty
    Statements {
        principal: Principal,
        statements: Vec<CollectedStatement>,
    },
}

impl Aggregation {
    /// Collected statements; empty for an unknown principal
    pub fn statements(&self) -> &[CollectedStatement] {
        match self {
            Aggregation::UnknownPrincipal => &[],
            Aggregation::Statements { statements, .. } => statements,
        }
    }
}

/// Collects applicable statements from the registry
pub struct PolicyAggregator {
    registry: Arc<dyn Registry>,
}

impl PolicyAggregator {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Collect every statement reachable by `user_id` for a request scoped to
    /// `project`
    ///
    /// Order is binding order, then attachment order, then statement order.
    /// Nothing is deduplicated.
    pub async fn collect_statements(
        &self,
        user_id: &str,
        project: Option<&str>,
    ) -> Result<Aggregation> {
        let bindings = self
            .registry
            .get_role_bindings(user_id)
            .await
            .map_err(|e| unavailable("role bindings", user_id, e))?;

        let Some(bindings) = bindings else {
            debug!("Principal '{}' unknown to the registry", user_id);
            return Ok(Aggregation::UnknownPrincipal);
        };

        let principal = Principal {
            user_id: user_id.to_string(),
            bindings: bindings
                .into_iter()
                .filter(|b| b.applies_to(project))
                .collect(),
        };

        let fetches = principal.role_ids().map(|role_id| async move {
            self.registry
                .get_policy_documents(role_id)
                .await
                .map(|attached| (role_id, attached))
                .map_err(|e| unavailable("policy documents", role_id, e))
        });

        // try_join_all keeps input order
        let per_role: Vec<(&str, Vec<AttachedPolicy>)> = try_join_all(fetches).await?;

        let statements: Vec<CollectedStatement> = per_role
            .into_iter()
            .flat_map(|(role_id, attached)| {
                attached.into_iter().flat_map(move |policy| {
                    CollectedStatement::from_document(
                        Some(role_id.to_string()),
                        policy.policy_id,
                        policy.document,
                    )
                })
            })
            .collect();

        debug!(
            "Collected {} statements for '{}' from {} bindings (project: {:?})",
            statements.len(),
            user_id,
            principal.bindings.len(),
            project
        );

        Ok(Aggregation::Statements {
            principal,
            statements,
        })
    }
}

fn unavailable(what: &str, id: &str, error: AuthzError) -> AuthzError {
    warn!("Registry failed to return {} for '{}': {}", what, id, error);
    match error {
        AuthzError::RegistryUnavailable(_) => error,
        other => AuthzError::RegistryUnavailable(format!("{} for '{}': {}", what, id, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::types::{Role, RoleBinding};
    use serde_json::json;

    fn policy(action: &str) -> String {
        json!({
            "Version": "2024-01-01",
            "Statement": [
                { "Effect": "Allow", "Action": action, "Resource": "*" },
                { "Effect": "Deny", "Action": action, "Resource": "bucket:secret/*" }
            ]
        })
        .to_string()
    }

    async fn registry() -> Arc<InMemoryRegistry> {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.put_policy_json("p-read", &policy("storage:Get*")).await.unwrap();
        registry.put_policy_json("p-write", &policy("storage:Put*")).await.unwrap();
        registry.put_role(Role::new("reader").with_policy("p-read")).await;
        registry.put_role(Role::new("writer").with_policy("p-write").with_policy("p-read")).await;
        registry.bind_role("alice", RoleBinding::org_wide("reader")).await;
        registry.bind_role("alice", RoleBinding::in_project("writer", "proj-1")).await;
        registry
    }

    #[tokio::test]
    async fn test_unknown_principal() {
        let aggregator = PolicyAggregator::new(registry().await);
        let result = aggregator.collect_statements("mallory", None).await.unwrap();
        assert!(matches!(result, Aggregation::UnknownPrincipal));
    }

    #[tokio::test]
    async fn test_org_wide_only_without_project() {
        let aggregator = PolicyAggregator::new(registry().await);
        let result = aggregator.collect_statements("alice", None).await.unwrap();

        let statements = result.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements.iter().all(|s| s.role_id.as_deref() == Some("reader")));
    }

    #[tokio::test]
    async fn test_project_bindings_in_order_without_dedup() {
        let aggregator = PolicyAggregator::new(registry().await);
        let result = aggregator.collect_statements("alice", Some("proj-1")).await.unwrap();

        let order: Vec<_> = result
            .statements()
            .iter()
            .map(|s| (s.role_id.as_deref().unwrap_or(""), s.policy_id.as_str(), s.index))
            .collect();

        assert_eq!(
            order,
            vec![
                ("reader", "p-read", 0),
                ("reader", "p-read", 1),
                ("writer", "p-write", 0),
                ("writer", "p-write", 1),
                ("writer", "p-read", 0),
                ("writer", "p-read", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_known_principal_without_roles() {
        let registry = registry().await;
        registry.add_user("bob").await;

        let aggregator = PolicyAggregator::new(registry);
        match aggregator.collect_statements("bob", None).await.unwrap() {
            Aggregation::Statements { principal, statements } => {
                assert_eq!(principal.user_id, "bob");
                assert!(statements.is_empty());
            }
            Aggregation::UnknownPrincipal => panic!("bob is known"),
        }
    }
}
