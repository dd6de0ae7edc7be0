//! Decision engine
//!
//! Orchestrates statement collection and the deny-overrides reduction.
//!
//! ```text
//! AuthzRequest → PolicyAggregator → Statement::applies → decide → Decision
//!                     ↓
//!            [CachedRegistry] → Registry
//! ```

pub mod decision;

pub use decision::{decide, Decision, DecisionReason, MatchedStatement, Outcome};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregation, PolicyAggregator};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::registry::{CachedRegistry, Registry};
use crate::types::AuthzRequest;

/// Policy evaluation engine
///
/// Holds no mutable state of its own; share it behind an `Arc` and evaluate
/// concurrently.
pub struct PolicyEngine {
    aggregator: PolicyAggregator,

    /// Present when built with caching enabled
    cache: Option<Arc<CachedRegistry>>,
}

impl PolicyEngine {
    /// Engine reading the registry directly, without caching
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        info!("PolicyEngine initialized (cache=false)");
        Self {
            aggregator: PolicyAggregator::new(registry),
            cache: None,
        }
    }

    /// Engine built from configuration
    ///
    /// Wraps `registry` in a [`CachedRegistry`] when caching is enabled.
    pub fn from_config(config: &EngineConfig, registry: Arc<dyn Registry>) -> Result<Self> {
        config.validate()?;

        if !config.cache.enabled {
            return Ok(Self::new(registry));
        }

        let cache = Arc::new(CachedRegistry::new(
            registry,
            config.cache.ttl(),
            config.cache.capacity,
        ));

        info!(
            "PolicyEngine initialized (cache=true, ttl={}s, capacity={})",
            config.cache.ttl_secs, config.cache.capacity
        );

        Ok(Self {
            aggregator: PolicyAggregator::new(cache.clone()),
            cache: Some(cache),
        })
    }

    /// Registry cache, for invalidation after policy or binding changes
    pub fn cache(&self) -> Option<&CachedRegistry> {
        self.cache.as_deref()
    }

    /// Decide whether the request is permitted
    ///
    /// Registry failures are returned as errors and never turned into a
    /// decision.
    pub async fn evaluate(&self, request: &AuthzRequest) -> Result<Decision> {
        let start = Instant::now();

        debug!(
            "Evaluating {} -> {} on {} (project: {:?})",
            request.principal, request.action, request.resource, request.project
        );

        let aggregation = match self.collect(request).await {
            Ok(aggregation) => aggregation,
            Err(e) => {
                warn!("Evaluation for '{}' aborted: {}", request.principal, e);
                return Err(e);
            }
        };

        let decision = match &aggregation {
            Aggregation::UnknownPrincipal => Decision::no_principal_data(),
            Aggregation::Statements { statements, .. } => decide(
                statements,
                &request.action,
                &request.resource,
                &request.context,
            ),
        };

        info!(
            principal = %request.principal,
            action = %request.action,
            resource = %request.resource,
            outcome = %decision.outcome,
            reason = ?decision.reason,
            "Authorization decision in {:?}",
            start.elapsed()
        );

        Ok(decision)
    }

    pub(crate) async fn collect(&self, request: &AuthzRequest) -> Result<Aggregation> {
        self.aggregator
            .collect_statements(&request.principal, request.project.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::types::{Role, RoleBinding};
    use serde_json::json;

    async fn registry() -> Arc<InMemoryRegistry> {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .put_policy_json(
                "read-all",
                &json!({
                    "Version": "2024-01-01",
                    "Statement": [{ "Effect": "Allow", "Action": "*:Get*", "Resource": "*" }]
                })
                .to_string(),
            )
            .await
            .unwrap();
        registry.put_role(Role::new("viewer").with_policy("read-all")).await;
        registry.bind_role("alice", RoleBinding::org_wide("viewer")).await;
        registry
    }

    #[tokio::test]
    async fn test_evaluate_without_cache() {
        let engine = PolicyEngine::new(registry().await);
        assert!(engine.cache().is_none());

        let allowed = engine
            .evaluate(&AuthzRequest::new("alice", "storage:GetObject", "bucket:raw/a"))
            .await
            .unwrap();
        assert!(allowed.is_allowed());

        let unknown = engine
            .evaluate(&AuthzRequest::new("nobody", "storage:GetObject", "bucket:raw/a"))
            .await
            .unwrap();
        assert_eq!(unknown, Decision::no_principal_data());
    }

    #[tokio::test]
    async fn test_cache_invalidation_exposes_binding_change() {
        let registry = registry().await;
        let engine = PolicyEngine::from_config(&EngineConfig::default(), registry.clone()).unwrap();
        let request = AuthzRequest::new("alice", "storage:GetObject", "bucket:raw/a");

        assert!(engine.evaluate(&request).await.unwrap().is_allowed());

        registry
            .unbind_role("alice", &RoleBinding::org_wide("viewer"))
            .await;
        // Still served from cache
        assert!(engine.evaluate(&request).await.unwrap().is_allowed());

        engine.cache().unwrap().invalidate_user("alice");
        let decision = engine.evaluate(&request).await.unwrap();
        assert_eq!(decision.reason, DecisionReason::ImplicitDeny);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.cache.capacity = 0;
        assert!(PolicyEngine::from_config(&config, Arc::new(InMemoryRegistry::new())).is_err());
    }
}
