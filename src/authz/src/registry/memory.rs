//! In-memory registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{AttachedPolicy, Registry, RegistrySnapshot, RolePolicies};
use crate::error::Result;
use crate::policy::{PolicyDocument, PolicyDocumentSource};
use crate::types::{PolicyId, Role, RoleBinding, RoleId, UserId};

#[derive(Default)]
struct RegistryState {
    bindings: HashMap<UserId, Vec<RoleBinding>>,
    roles: HashMap<RoleId, Role>,
    policies: HashMap<PolicyId, Arc<PolicyDocument>>,
}

/// Registry backed by process memory
///
/// Used for tests, simulations and as the target of a loaded
/// [`RegistrySnapshot`]. Writes are visible to the next read.
pub struct InMemoryRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    /// Build a registry from a snapshot of stored data
    ///
    /// Stored documents are loaded leniently: malformed statements are
    /// dropped, valid ones are kept.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut state = RegistryState::default();

        for (policy_id, source) in snapshot.policies {
            let document = PolicyDocument::load_stored(&policy_id, source);
            state.policies.insert(policy_id, Arc::new(document));
        }

        for (role_id, attached_policies) in snapshot.roles {
            state.roles.insert(
                role_id.clone(),
                Role {
                    id: role_id,
                    attached_policies,
                },
            );
        }

        state.bindings = snapshot.bindings.into_iter().collect();

        debug!(
            "Loaded registry snapshot: {} users, {} roles, {} policies",
            state.bindings.len(),
            state.roles.len(),
            state.policies.len()
        );

        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Store a validated policy document
    pub async fn put_policy(&self, policy_id: impl Into<PolicyId>, document: PolicyDocument) {
        let mut state = self.state.write().await;
        state.policies.insert(policy_id.into(), Arc::new(document));
    }

    /// Validate and store a policy document from its wire form
    pub async fn put_policy_source(
        &self,
        policy_id: impl Into<PolicyId>,
        source: PolicyDocumentSource,
    ) -> Result<()> {
        let document = PolicyDocument::parse(source)?;
        self.put_policy(policy_id, document).await;
        Ok(())
    }

    /// Validate and store a policy document from JSON
    pub async fn put_policy_json(&self, policy_id: impl Into<PolicyId>, json: &str) -> Result<()> {
        let document = PolicyDocument::from_json(json)?;
        self.put_policy(policy_id, document).await;
        Ok(())
    }

    /// Remove a policy document; roles keep their (now dangling) attachment
    pub async fn remove_policy(&self, policy_id: &str) -> Option<Arc<PolicyDocument>> {
        let mut state = self.state.write().await;
        state.policies.remove(policy_id)
    }

    /// Create or replace a role
    pub async fn put_role(&self, role: Role) {
        let mut state = self.state.write().await;
        state.roles.insert(role.id.clone(), role);
    }

    /// Remove a role
    pub async fn remove_role(&self, role_id: &str) -> Option<Role> {
        let mut state = self.state.write().await;
        state.roles.remove(role_id)
    }

    /// Register a user with no bindings
    pub async fn add_user(&self, user_id: impl Into<UserId>) {
        let mut state = self.state.write().await;
        state.bindings.entry(user_id.into()).or_default();
    }

    /// Bind a role to a user (registers the user if needed)
    pub async fn bind_role(&self, user_id: impl Into<UserId>, binding: RoleBinding) {
        let mut state = self.state.write().await;
        let bindings = state.bindings.entry(user_id.into()).or_default();
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
    }

    /// Remove a binding; returns whether it existed
    pub async fn unbind_role(&self, user_id: &str, binding: &RoleBinding) -> bool {
        let mut state = self.state.write().await;
        match state.bindings.get_mut(user_id) {
            Some(bindings) => {
                let before = bindings.len();
                bindings.retain(|b| b != binding);
                bindings.len() != before
            }
            None => false,
        }
    }

    /// Forget a user entirely
    pub async fn remove_user(&self, user_id: &str) -> bool {
        let mut state = self.state.write().await;
        state.bindings.remove(user_id).is_some()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn get_role_bindings(&self, user_id: &str) -> Result<Option<Vec<RoleBinding>>> {
        let state = self.state.read().await;
        Ok(state.bindings.get(user_id).cloned())
    }

    async fn get_policy_documents(&self, role_id: &str) -> Result<Vec<AttachedPolicy>> {
        Ok(self.get_role_policies(role_id).await?.documents)
    }

    async fn get_role_policies(&self, role_id: &str) -> Result<RolePolicies> {
        let state = self.state.read().await;

        let Some(role) = state.roles.get(role_id) else {
            debug!("Role '{}' not found, no policies attached", role_id);
            return Ok(RolePolicies::default());
        };

        let mut policies = RolePolicies::default();
        for policy_id in &role.attached_policies {
            match state.policies.get(policy_id) {
                Some(document) => policies
                    .documents
                    .push(AttachedPolicy::new(policy_id.clone(), document.clone())),
                None => {
                    warn!(
                        "Role '{}' references missing policy '{}', skipping",
                        role_id, policy_id
                    );
                    policies.unresolved.push(policy_id.clone());
                }
            }
        }

        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_policy() -> String {
        json!({
            "Version": "2024-01-01",
            "Statement": [{ "Effect": "Allow", "Action": "storage:Get*", "Resource": "*" }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_unknown_and_known_users() {
        let registry = InMemoryRegistry::new();
        assert_eq!(registry.get_role_bindings("ghost").await.unwrap(), None);

        registry.add_user("alice").await;
        assert_eq!(registry.get_role_bindings("alice").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_bind_and_unbind() {
        let registry = InMemoryRegistry::new();
        let binding = RoleBinding::in_project("editor", "proj-1");

        registry.bind_role("alice", binding.clone()).await;
        registry.bind_role("alice", binding.clone()).await;
        assert_eq!(registry.get_role_bindings("alice").await.unwrap().unwrap().len(), 1);

        assert!(registry.unbind_role("alice", &binding).await);
        assert!(!registry.unbind_role("alice", &binding).await);
        assert_eq!(registry.get_role_bindings("alice").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_policy_documents_follow_attachment_order() {
        let registry = InMemoryRegistry::new();
        registry.put_policy_json("p-read", &read_policy()).await.unwrap();
        registry.put_policy_json("p-read-2", &read_policy()).await.unwrap();
        registry
            .put_role(Role::new("viewer").with_policy("p-read-2").with_policy("missing").with_policy("p-read"))
            .await;

        let docs = registry.get_policy_documents("viewer").await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["p-read-2", "p-read"]);

        assert!(registry.get_policy_documents("nobody").await.unwrap().is_empty());

        let policies = registry.get_role_policies("viewer").await.unwrap();
        assert_eq!(policies.unresolved, vec!["missing".to_string()]);
        assert!(policies.references("missing"));
        assert!(policies.references("p-read"));
        assert!(!policies.references("p-write"));
    }

    #[tokio::test]
    async fn test_invalid_policy_is_rejected_at_write_time() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .put_policy_json("bad", r#"{"Version": "1", "Statement": [{"Effect": "Allow", "Action": [], "Resource": ["*"]}]}"#)
            .await;
        assert!(err.is_err());
        assert!(registry.remove_policy("bad").await.is_none());
    }
}
