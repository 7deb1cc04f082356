//! Role-based access policies for Sieve
//!
//! This crate decides whether a principal may perform an action on a
//! resource and, when it may, narrows the principal's query:
//!
//! - **Model** ([`Statement`], [`Rewrite`], [`Role`], [`Policy`]): plain
//!   records with defaults applied at construction
//! - **Source** ([`PolicySource`], [`StaticPolicySource`]): an immutable
//!   snapshot of roles and policies, loadable from JSON
//! - **Evaluation** ([`PolicyEvaluator`]): role activation, inheritance
//!   expansion, glob matching on actions and resources, deny-overrides
//! - **Authorization** ([`QueryAuthorizer`]): folds scope rewrites into the
//!   caller's [`sieve_query::Query`]
//! - **Engine** ([`PolicyEngine`]): one-call facade returning
//!   [`Authorization::Granted`] or [`Authorization::Denied`]
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sieve_policy::{AccessRequest, PolicyEngine, StaticPolicySource};
//! use sieve_query::Query;
//!
//! let source = StaticPolicySource::from_value(json!({
//!     "roles": [{
//!         "id": "member",
//!         "condition": true,
//!         "statements": [{
//!             "effect": "allow",
//!             "actions": ["search:*"],
//!             "resource": ["docs/*"],
//!             "scope": [{"key": "tenant", "value": "${user:org}", "replace": true}]
//!         }]
//!     }]
//! }))
//! .unwrap();
//! let engine = PolicyEngine::new(source);
//!
//! let request = AccessRequest::new("search:query", "docs/42")
//!     .with_role("member")
//!     .with_query(Query::term("status", "open"))
//!     .with_context(sieve_expr::Context::new().with("user", json!({"org": "acme"})));
//!
//! let auth = engine.authorize(&request).unwrap();
//! assert_eq!(
//!     auth.query(),
//!     Some(&Query::and(vec![
//!         Query::term("status", "open"),
//!         Query::term("tenant", "acme"),
//!     ]))
//! );
//! ```

mod authorize;
mod config;
mod engine;
mod error;
mod evaluate;
mod resolve;
mod source;
mod types;

pub use authorize::{constraint_for, QueryAuthorizer};
pub use config::EngineConfig;
pub use engine::{AccessRequest, Authorization, Denial, DenyReason, PolicyEngine};
pub use error::{PolicyError, Result};
pub use evaluate::{Decision, Evaluation, PolicyEvaluator};
pub use source::{PolicyDocument, PolicySource, StaticPolicySource};
pub use types::{Effect, Policy, Rewrite, Role, Statement};
