//! Engine facade
//!
//! [`PolicyEngine`] ties a [`PolicySource`], an expression [`Evaluator`] and
//! an [`EngineConfig`] together. One call to [`PolicyEngine::authorize`]
//! activates the requested roles, evaluates the statements, and either
//! returns the caller's query with the scope rewrites folded in or a
//! [`Denial`] saying why access was refused.

use crate::authorize::QueryAuthorizer;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::evaluate::{Decision, Evaluation, PolicyEvaluator};
use crate::source::PolicySource;
use serde::{Deserialize, Serialize};
use sieve_expr::{Context, Evaluator};
use sieve_query::Query;
use tracing::debug;

/// One access attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Candidate role ids; each is activated only if its condition holds
    #[serde(default)]
    pub roles: Vec<String>,
    /// Namespaced action name, e.g. `search:query`
    pub action: String,
    /// Resource identifier, e.g. `docs/42`
    pub resource: String,
    #[serde(default = "Query::match_all")]
    pub query: Query,
    #[serde(default)]
    pub context: Context,
}

impl AccessRequest {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            roles: Vec::new(),
            action: action.into(),
            resource: resource.into(),
            query: Query::match_all(),
            context: Context::new(),
        }
    }

    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.roles.push(role_id.into());
        self
    }

    pub fn with_roles<I>(mut self, role_ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.roles.extend(role_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// None of the candidate roles activated
    NoActiveRole,
    /// Roles were active but no statement matched
    Implicit,
    /// A deny statement matched
    Explicit { statement: String },
}

/// A refused request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub action: String,
    pub resource: String,
    #[serde(flatten)]
    pub reason: DenyReason,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' on '{}' denied: ", self.action, self.resource)?;
        match &self.reason {
            DenyReason::NoActiveRole => write!(f, "no active role"),
            DenyReason::Implicit => write!(f, "no statement allows it"),
            DenyReason::Explicit { statement } => write!(f, "denied by statement '{statement}'"),
        }
    }
}

/// Outcome of [`PolicyEngine::authorize`]. Denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// The authorized query to run
    Granted(Query),
    Denied(Denial),
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    pub fn query(&self) -> Option<&Query> {
        match self {
            Self::Granted(query) => Some(query),
            Self::Denied(_) => None,
        }
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Granted(_) => None,
            Self::Denied(denial) => Some(denial),
        }
    }
}

/// Authorizes requests against a policy snapshot
#[derive(Debug)]
pub struct PolicyEngine<S> {
    source: S,
    evaluator: Evaluator,
    config: EngineConfig,
}

impl<S: PolicySource> PolicyEngine<S> {
    /// Engine with the default evaluator and configuration
    pub fn new(source: S) -> Self {
        Self {
            source,
            evaluator: Evaluator::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Activate the request's roles and evaluate it, without touching the query
    pub fn evaluate(&self, request: &AccessRequest) -> Result<Evaluation> {
        let policy_eval = PolicyEvaluator::new(&self.evaluator, &self.config);
        let active = policy_eval.activate(&self.source, &request.roles, &request.context);
        policy_eval.evaluate(
            &self.source,
            &active,
            &request.action,
            &request.resource,
            &request.context,
        )
    }

    /// Decide the request and, on allow, return the authorized query
    pub fn authorize(&self, request: &AccessRequest) -> Result<Authorization> {
        let span = tracing::debug_span!(
            "policy_authorize",
            action = %request.action,
            resource = %request.resource,
            decision = tracing::field::Empty,
        );
        let _guard = span.enter();

        let evaluation = self.evaluate(request)?;
        let reason = match evaluation.decision {
            Decision::Allow => {
                span.record("decision", "allow");
                let query = QueryAuthorizer::new(&self.evaluator)
                    .with_dedupe_constraints(self.config.dedupe_constraints)
                    .apply(&request.query, &evaluation.rewrites, &request.context)?;
                debug!(rewrites = evaluation.rewrites.len(), "Access granted");
                return Ok(Authorization::Granted(query));
            }
            Decision::Deny { statement } => DenyReason::Explicit { statement },
            Decision::Implicit if evaluation.active_roles.is_empty() => DenyReason::NoActiveRole,
            Decision::Implicit => DenyReason::Implicit,
        };

        span.record("decision", "deny");
        debug!(reason = ?reason, "Access denied");
        Ok(Authorization::Denied(Denial {
            action: request.action.clone(),
            resource: request.resource.clone(),
            reason,
        }))
    }
}
