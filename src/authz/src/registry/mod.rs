//! Access to the external resource registry
//!
//! The engine never owns users, roles, bindings or policies. It reads them
//! through [`Registry`] for every evaluation, optionally through a
//! [`CachedRegistry`]. Any failure to answer is reported as
//! [`AuthzError::RegistryUnavailable`](crate::error::AuthzError::RegistryUnavailable)
//! so callers can tell "denied" apart from "could not determine".

mod cache;
mod memory;
mod snapshot;

pub use cache::{CacheStats, CachedRegistry};
pub use memory::InMemoryRegistry;
pub use snapshot::RegistrySnapshot;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::policy::PolicyDocument;
use crate::types::{PolicyId, RoleBinding};

/// A policy document attached to a role
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedPolicy {
    /// Policy identifier
    pub policy_id: PolicyId,

    /// Loaded document
    pub document: Arc<PolicyDocument>,
}

impl AttachedPolicy {
    pub fn new(policy_id: impl Into<PolicyId>, document: Arc<PolicyDocument>) -> Self {
        Self {
            policy_id: policy_id.into(),
            document,
        }
    }
}

/// Everything attached to a role, including ids that did not resolve
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolePolicies {
    /// Resolved documents, in attachment order
    pub documents: Vec<AttachedPolicy>,

    /// Attached policy ids with no stored document
    pub unresolved: Vec<PolicyId>,
}

impl RolePolicies {
    /// Whether `policy_id` is attached, resolved or not
    pub fn references(&self, policy_id: &str) -> bool {
        self.documents.iter().any(|p| p.policy_id == policy_id)
            || self.unresolved.iter().any(|id| id == policy_id)
    }
}

/// Read-only view of the registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// Role bindings of a user
    ///
    /// `Ok(None)` means the user is unknown to the registry; `Ok(Some(vec![]))`
    /// is a known user with no roles.
    async fn get_role_bindings(&self, user_id: &str) -> Result<Option<Vec<RoleBinding>>>;

    /// Policy documents attached to a role, in attachment order
    ///
    /// An unknown role has no documents.
    async fn get_policy_documents(&self, role_id: &str) -> Result<Vec<AttachedPolicy>>;

    /// Policy documents of a role plus the attached ids that did not resolve
    ///
    /// Registries that know about dangling attachments should override this
    /// so that caches can be invalidated when the missing policy appears.
    async fn get_role_policies(&self, role_id: &str) -> Result<RolePolicies> {
        Ok(RolePolicies {
            documents: self.get_policy_documents(role_id).await?,
            unresolved: Vec::new(),
        })
    }
}

