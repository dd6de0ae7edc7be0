//! Policy simulation
//!
//! Answers "what would happen if" without performing the action. A
//! simulated decision must never be used to gate a real operation; always
//! call [`PolicyEngine::evaluate`] for that.

use std::sync::Arc;
use tracing::debug;

use crate::aggregator::{Aggregation, CollectedStatement};
use crate::engine::{decide, Decision, PolicyEngine};
use crate::error::Result;
use crate::policy::PolicyDocument;
use crate::types::{AuthzRequest, EvaluationContext, PolicyId};

/// Simulation facade over a [`PolicyEngine`]
pub struct Simulator {
    engine: Arc<PolicyEngine>,
}

impl Simulator {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Evaluate the request exactly as the engine would
    pub async fn simulate(&self, request: &AuthzRequest) -> Result<Decision> {
        debug!("Simulating {} on {}", request.action, request.resource);
        self.engine.evaluate(request).await
    }

    /// Evaluate the principal's current statements plus proposed documents
    ///
    /// Proposed documents are evaluated as if attached to the principal, after
    /// the existing ones. An unknown principal still gets
    /// `NoApplicablePrincipalData`.
    pub async fn simulate_with_proposed(
        &self,
        request: &AuthzRequest,
        proposed: &[(PolicyId, Arc<PolicyDocument>)],
    ) -> Result<Decision> {
        let mut statements = match self.engine.collect(request).await? {
            Aggregation::UnknownPrincipal => return Ok(Decision::no_principal_data()),
            Aggregation::Statements { statements, .. } => statements,
        };

        statements.extend(collect_documents(proposed));

        debug!(
            "Simulating {} on {} with {} proposed documents",
            request.action,
            request.resource,
            proposed.len()
        );

        Ok(decide(
            &statements,
            &request.action,
            &request.resource,
            &request.context,
        ))
    }

    /// Evaluate a bare set of documents with no principal lookup
    pub fn simulate_documents(
        documents: &[(PolicyId, Arc<PolicyDocument>)],
        action: &str,
        resource: &str,
        context: &EvaluationContext,
    ) -> Decision {
        decide(&collect_documents(documents), action, resource, context)
    }
}

fn collect_documents(documents: &[(PolicyId, Arc<PolicyDocument>)]) -> Vec<CollectedStatement> {
    documents
        .iter()
        .flat_map(|(policy_id, document)| {
            CollectedStatement::from_document(None, policy_id.clone(), document.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DecisionReason;
    use crate::registry::InMemoryRegistry;
    use serde_json::json;

    fn deny_deletes() -> (PolicyId, Arc<PolicyDocument>) {
        let doc = PolicyDocument::from_json(
            &json!({
                "Version": "2024-01-01",
                "Statement": [{ "Effect": "Deny", "Action": "*:Delete*", "Resource": "*" }]
            })
            .to_string(),
        )
        .unwrap();
        ("deny-deletes".to_string(), Arc::new(doc))
    }

    #[test]
    fn test_simulate_documents() {
        let docs = vec![deny_deletes()];
        let ctx = EvaluationContext::new();

        let decision = Simulator::simulate_documents(&docs, "storage:DeleteObject", "bucket:a", &ctx);
        assert_eq!(decision.reason, DecisionReason::ExplicitDeny);
        assert_eq!(decision.matched_statement.unwrap().role_id, None);

        let decision = Simulator::simulate_documents(&docs, "storage:GetObject", "bucket:a", &ctx);
        assert_eq!(decision.reason, DecisionReason::ImplicitDeny);
    }

    #[tokio::test]
    async fn test_proposed_for_unknown_principal() {
        let engine = Arc::new(PolicyEngine::new(Arc::new(InMemoryRegistry::new())));
        let simulator = Simulator::new(engine);

        let request = AuthzRequest::new("ghost", "storage:DeleteObject", "bucket:a");
        let decision = simulator
            .simulate_with_proposed(&request, &[deny_deletes()])
            .await
            .unwrap();
        assert_eq!(decision, Decision::no_principal_data());
    }
}
