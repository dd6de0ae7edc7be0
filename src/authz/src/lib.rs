//! # MiniCloud Authorization Engine
//!
//! Decides whether a principal may perform an action on a resource, based on
//! IAM-style policy documents attached to the principal's roles.
//!
//! ## Features
//!
//! - **Deny overrides**: explicit deny beats explicit allow beats implicit deny
//! - **Wildcard patterns** over `service:Verb` actions and `type:path` resources
//! - **Conditions** over request context (source IP, time, strings, numbers)
//! - **Async registry** trait with an in-memory store and a TTL cache
//! - **Simulation** of requests and of not-yet-attached documents
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use minicloud_authz::{AuthzRequest, InMemoryRegistry, PolicyEngine, Role, RoleBinding};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(InMemoryRegistry::new());
//!     registry.put_policy_json("read-raw", r#"{
//!         "Version": "2024-01-01",
//!         "Statement": [{
//!             "Effect": "Allow",
//!             "Action": "storage:GetObject",
//!             "Resource": "bucket:raw/*"
//!         }]
//!     }"#).await?;
//!     registry.put_role(Role::new("analyst").with_policy("read-raw")).await;
//!     registry.bind_role("alice", RoleBinding::org_wide("analyst")).await;
//!
//!     let engine = PolicyEngine::new(registry);
//!     let request = AuthzRequest::new("alice", "storage:GetObject", "bucket:raw/file.txt");
//!     let decision = engine.evaluate(&request).await?;
//!
//!     assert!(decision.is_allowed());
//!     println!("{}", decision.explanation());
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod policy;
pub mod registry;
pub mod simulation;
pub mod statement;
pub mod types;

pub use aggregator::{Aggregation, CollectedStatement, PolicyAggregator};
pub use condition::{ConditionOperator, Conditions};
pub use config::EngineConfig;
pub use engine::{decide, Decision, DecisionReason, MatchedStatement, Outcome, PolicyEngine};
pub use error::{AuthzError, Result};
pub use pattern::Pattern;
pub use policy::{PolicyDocument, PolicyDocumentSource, StoredPolicyDocument};
pub use registry::{
    AttachedPolicy, CachedRegistry, InMemoryRegistry, Registry, RegistrySnapshot, RolePolicies,
};
pub use simulation::Simulator;
pub use statement::{Effect, Statement, StatementDocument};
pub use types::{
    AuthzRequest, EvaluationContext, Principal, Role, RoleBinding, UserId, RoleId, PolicyId,
    ProjectId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
