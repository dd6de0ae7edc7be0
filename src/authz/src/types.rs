//! Core authorization types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique user identifier
pub type UserId = String;

/// Unique role identifier
pub type RoleId = String;

/// Unique policy identifier
pub type PolicyId = String;

/// Project identifier used to scope role bindings
pub type ProjectId = String;

/// Policy fields that accept either a single value or a list
///
/// `"Action": "storage:*"` and `"Action": ["storage:*"]` mean the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Borrow the values as a slice
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }

    /// Whether there are no values at all
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// A role bound to a user, optionally scoped to one project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Bound role
    pub role: RoleId,

    /// Project scope; `None` applies org-wide
    #[serde(default)]
    pub project: Option<ProjectId>,
}

impl RoleBinding {
    /// Org-wide binding
    pub fn org_wide(role: impl Into<RoleId>) -> Self {
        Self {
            role: role.into(),
            project: None,
        }
    }

    /// Binding scoped to a single project
    pub fn in_project(role: impl Into<RoleId>, project: impl Into<ProjectId>) -> Self {
        Self {
            role: role.into(),
            project: Some(project.into()),
        }
    }

    /// Whether this binding is in effect for a request scoped to `project`
    ///
    /// Org-wide bindings always apply. Project bindings apply only when the
    /// request names the same project.
    pub fn applies_to(&self, project: Option<&str>) -> bool {
        match &self.project {
            None => true,
            Some(bound) => project == Some(bound.as_str()),
        }
    }
}

/// Role with the policies attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier
    pub id: RoleId,

    /// Attached policy documents, in attachment order
    #[serde(default)]
    pub attached_policies: Vec<PolicyId>,
}

impl Role {
    /// Create a role with no attached policies
    pub fn new(id: impl Into<RoleId>) -> Self {
        Self {
            id: id.into(),
            attached_policies: Vec::new(),
        }
    }

    /// Attach a policy
    pub fn with_policy(mut self, policy: impl Into<PolicyId>) -> Self {
        self.attached_policies.push(policy.into());
        self
    }
}

/// Acting user together with the role bindings that are in effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User identifier
    pub user_id: UserId,

    /// Role bindings that apply to the current request
    pub bindings: Vec<RoleBinding>,
}

impl Principal {
    /// Ids of the bound roles, in binding order
    pub fn role_ids(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.role.as_str())
    }
}

/// Per-request context used by statement conditions
///
/// Keys are matched exactly. A key written with a service prefix
/// (`aws:SourceIp`) falls back to its bare name (`SourceIp`) when the full
/// key is not present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext {
    values: HashMap<String, String>,
}

impl EvaluationContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key/value pair
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a context value
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.values.get(key) {
            return Some(value);
        }

        match key.split_once(':') {
            Some((_, name)) if !name.is_empty() => self.values.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzRequest {
    /// Acting user
    pub principal: UserId,

    /// Action in `service:Verb` form (e.g. `storage:GetObject`)
    pub action: String,

    /// Resource in `type:path` form (e.g. `bucket:raw/file.txt`)
    pub resource: String,

    /// Request context (source IP, request time, ...)
    #[serde(default)]
    pub context: EvaluationContext,

    /// Project the request is scoped to; `None` uses org-wide bindings only
    #[serde(default)]
    pub project: Option<ProjectId>,
}

impl AuthzRequest {
    /// Create a request with an empty context and no project scope
    pub fn new(
        principal: impl Into<UserId>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            action: action.into(),
            resource: resource.into(),
            context: EvaluationContext::new(),
            project: None,
        }
    }

    /// Add a context value
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key, value);
        self
    }

    /// Scope the request to a project
    pub fn in_project(mut self, project: impl Into<ProjectId>) -> Self {
        self.project = Some(project.into());
        self
    }
}
