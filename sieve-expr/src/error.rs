//! Expression error types

use thiserror::Error;

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Error)]
pub enum ExprError {
    /// Malformed expression source
    #[error("Invalid expression '{source_text}': {message}")]
    Parse {
        source_text: String,
        message: String,
    },

    /// Pipe name not registered with the evaluator
    #[error("Unknown pipe: {name}")]
    UnknownPipe { name: String },

    /// Pipe argument missing or unparseable
    #[error("Invalid argument for pipe '{pipe}': {message}")]
    InvalidArgument { pipe: String, message: String },

    /// Value has the wrong shape for the operation
    #[error("Type mismatch in '{operation}': expected {expected}, got {actual}")]
    TypeMismatch {
        operation: String,
        expected: String,
        actual: String,
    },

    /// A condition evaluated to something other than a boolean or null
    #[error("Condition did not evaluate to a boolean: {value}")]
    NotBoolean { value: String },

    /// Failure reported by a custom key resolver
    #[error("Cannot resolve '{namespace}:{key}': {message}")]
    Resolve {
        namespace: String,
        key: String,
        message: String,
    },
}

impl ExprError {
    pub fn parse(source_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_text: source_text.into(),
            message: message.into(),
        }
    }

    pub fn unknown_pipe(name: impl Into<String>) -> Self {
        Self::UnknownPipe { name: name.into() }
    }

    pub fn invalid_argument(pipe: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            pipe: pipe.into(),
            message: message.into(),
        }
    }

    /// Type mismatch; `actual` is rendered from the offending JSON value
    pub fn type_mismatch(
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: &serde_json::Value,
    ) -> Self {
        Self::TypeMismatch {
            operation: operation.into(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    pub fn resolve(
        namespace: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Resolve {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;
