//! Registry snapshots: stored policies, roles and bindings in one file

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::policy::StoredPolicyDocument;
use crate::types::{PolicyId, RoleBinding, RoleId, UserId};

/// Serialized registry contents
///
/// ```json
/// {
///   "policies": { "read-raw": { "Version": "2024-01-01", "Statement": [] } },
///   "roles": { "analyst": ["read-raw"] },
///   "bindings": { "alice": [{ "role": "analyst", "project": null }] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Stored policy documents by id, loaded leniently
    #[serde(default)]
    pub policies: BTreeMap<PolicyId, StoredPolicyDocument>,

    /// Attached policy ids by role
    #[serde(default)]
    pub roles: BTreeMap<RoleId, Vec<PolicyId>>,

    /// Role bindings by user
    #[serde(default)]
    pub bindings: BTreeMap<UserId, Vec<RoleBinding>>,
}

impl RegistrySnapshot {
    /// Parse a snapshot from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a snapshot file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
