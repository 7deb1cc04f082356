//! Query decode and validation errors

use thiserror::Error;

/// Errors surfaced while decoding or validating a query document.
///
/// The algebra itself (`simplify`, `negate`) is total and never produces
/// these; they only arise at the wire boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The document is not a well-formed query (includes unknown `op` values)
    #[error("Query decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A range node carries contradictory or missing bounds
    #[error("Invalid range on field '{field}': {message}")]
    InvalidRange { field: String, message: String },
}

impl QueryError {
    /// Create an invalid range error
    pub fn invalid_range(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRange {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for query decoding
pub type Result<T> = std::result::Result<T, QueryError>;
