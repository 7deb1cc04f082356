//! Policy error types
//!
//! Access denial is not an error; see [`crate::Authorization::Denied`].
//! These cover inconsistent policy data, failed expressions that cannot be
//! handled fail-closed, and decode/config problems.

use sieve_expr::ExprError;
use sieve_query::QueryError;
use thiserror::Error;

/// Policy-related errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A role inherits from a role id the source does not define
    #[error("Role '{referenced_by}' inherits unknown role '{role}'")]
    UnknownRole { role: String, referenced_by: String },

    /// A role pulls in a policy id the source does not define
    #[error("Role '{role}' references unknown policy '{policy}'")]
    UnknownPolicy { policy: String, role: String },

    /// Role inheritance loops back on itself
    #[error("Role inheritance cycle: {path}")]
    InheritanceCycle { path: String },

    /// Role inheritance chain longer than the configured maximum
    #[error("Role '{role}' exceeds maximum inheritance depth {max}")]
    InheritanceDepth { role: String, max: usize },

    /// Two roles or two policies share an id
    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    /// Expression failure that cannot be treated as a non-match
    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    /// A scope rewrite's value could not be computed
    #[error("Cannot evaluate rewrite for '{key}': {source}")]
    RewriteEvaluation {
        key: String,
        #[source]
        source: ExprError,
    },

    /// A rewrite value has a shape that maps to no query constraint
    #[error("Invalid constraint for '{key}': {message}")]
    InvalidConstraint { key: String, message: String },

    /// A rewrite value carried an invalid query
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Malformed policy document
    #[error("Policy decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Malformed engine configuration
    #[error("Config error: {message}")]
    Config { message: String },
}

impl PolicyError {
    pub fn unknown_role(role: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Self::UnknownRole {
            role: role.into(),
            referenced_by: referenced_by.into(),
        }
    }

    pub fn unknown_policy(policy: impl Into<String>, role: impl Into<String>) -> Self {
        Self::UnknownPolicy {
            policy: policy.into(),
            role: role.into(),
        }
    }

    pub fn duplicate_id(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind,
            id: id.into(),
        }
    }

    pub fn rewrite(key: impl Into<String>, source: ExprError) -> Self {
        Self::RewriteEvaluation {
            key: key.into(),
            source,
        }
    }

    pub fn invalid_constraint(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConstraint {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for errors caused by inconsistent policy data rather than a request
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownRole { .. }
                | Self::UnknownPolicy { .. }
                | Self::InheritanceCycle { .. }
                | Self::InheritanceDepth { .. }
                | Self::DuplicateId { .. }
                | Self::Config { .. }
        )
    }
}

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
