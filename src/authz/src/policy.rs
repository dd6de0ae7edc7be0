//! Policy documents
//!
//! The wire format follows the familiar IAM shape:
//!
//! ```json
//! {
//!   "Version": "2024-01-01",
//!   "Statement": [
//!     { "Effect": "Allow", "Action": ["storage:GetObject"], "Resource": ["bucket:raw/*"] }
//!   ]
//! }
//! ```
//!
//! Documents are parsed into [`PolicyDocument`] once, at load time. Writers
//! go through [`PolicyDocument::parse`], which rejects the whole document on
//! the first malformed statement. Documents already in storage arrive as
//! [`StoredPolicyDocument`] and are loaded with [`PolicyDocument::load_stored`],
//! which keeps the valid statements and drops the rest so that a bad rule can
//! never match.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuthzError, Result};
use crate::statement::{Statement, StatementDocument};

/// Default document version for documents built in code
pub const DEFAULT_VERSION: &str = "2024-01-01";

/// A policy document as exchanged on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocumentSource {
    /// Policy format version
    pub version: String,

    /// Ordered statements
    #[serde(default)]
    pub statement: Vec<StatementDocument>,
}

impl PolicyDocumentSource {
    /// Empty document with the default version
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            statement: Vec::new(),
        }
    }

    /// Append a statement
    pub fn with_statement(mut self, statement: StatementDocument) -> Self {
        self.statement.push(statement);
        self
    }

    /// Parse the wire JSON without validating statements
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for PolicyDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

/// A policy document as found in storage
///
/// Statements stay untyped until [`PolicyDocument::load_stored`] so that one
/// malformed statement (unknown effect, missing field) cannot make the whole
/// document, or the snapshot holding it, unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoredPolicyDocument {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub statement: Vec<serde_json::Value>,
}

impl From<PolicyDocumentSource> for StoredPolicyDocument {
    fn from(source: PolicyDocumentSource) -> Self {
        Self {
            version: source.version,
            statement: source
                .statement
                .iter()
                .filter_map(|stmt| serde_json::to_value(stmt).ok())
                .collect(),
        }
    }
}

/// A loaded policy document with compiled statements
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDocument {
    version: String,
    statements: Vec<Statement>,
}

impl PolicyDocument {
    /// Validate a document for storage (write-time validation)
    ///
    /// Rejects a blank version, an empty statement list and any malformed
    /// statement.
    pub fn parse(source: PolicyDocumentSource) -> Result<Self> {
        if source.version.trim().is_empty() {
            return Err(AuthzError::Validation(
                "Policy document must have a version".to_string(),
            ));
        }

        if source.statement.is_empty() {
            return Err(AuthzError::Validation(
                "Policy document must have at least one statement".to_string(),
            ));
        }

        let statements = source
            .statement
            .into_iter()
            .enumerate()
            .map(|(idx, stmt)| {
                Statement::compile(stmt).map_err(|e| match e {
                    AuthzError::Validation(msg) => {
                        AuthzError::Validation(format!("Statement[{}]: {}", idx, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: source.version,
            statements,
        })
    }

    /// Parse and validate wire JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let source = PolicyDocumentSource::from_json(json)
            .map_err(|e| AuthzError::Validation(format!("Malformed policy document: {}", e)))?;
        Self::parse(source)
    }

    /// Load a document that is already stored
    ///
    /// Statements that do not deserialize or do not validate are logged and
    /// dropped instead of failing the whole document, so the remaining
    /// statements still take part in evaluation and the bad ones never match.
    pub fn load_stored(policy_id: &str, stored: StoredPolicyDocument) -> Self {
        let mut statements = Vec::with_capacity(stored.statement.len());

        for (idx, value) in stored.statement.into_iter().enumerate() {
            let compiled = serde_json::from_value::<StatementDocument>(value)
                .map_err(AuthzError::from)
                .and_then(Statement::compile);

            match compiled {
                Ok(statement) => statements.push(statement),
                Err(e) => warn!(
                    "Dropping malformed statement {} of stored policy '{}': {}",
                    idx, policy_id, e
                ),
            }
        }

        Self {
            version: stored.version,
            statements,
        }
    }

    /// Document version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Compiled statements, in document order
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Rebuild the wire form
    pub fn to_source(&self) -> PolicyDocumentSource {
        PolicyDocumentSource {
            version: self.version.clone(),
            statement: self.statements.iter().map(|s| s.source().clone()).collect(),
        }
    }
}
