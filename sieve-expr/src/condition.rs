//! Boolean-valued expressions

use crate::error::Result;
use crate::expr::Expr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// An expression evaluated for its truth value.
///
/// Evaluates through [`crate::Evaluator::check`]: `true`/`false` as given,
/// `null` as false, anything else is an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(Expr);

impl Condition {
    pub fn new(expr: Expr) -> Self {
        Self(expr)
    }

    /// Condition that always holds
    pub fn always() -> Self {
        Self(Expr::literal(true))
    }

    /// Condition that never holds
    pub fn never() -> Self {
        Self(Expr::literal(false))
    }

    /// Parse source text; the strings `"true"` and `"false"` are boolean literals.
    pub fn parse(source: &str) -> Result<Self> {
        match source.trim() {
            "true" => Ok(Self::always()),
            "false" => Ok(Self::never()),
            _ => Ok(Self(Expr::parse(source)?)),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.0
    }

    pub fn is_always(&self) -> bool {
        self.0 == Expr::Literal(Value::Bool(true))
    }

    pub fn is_never(&self) -> bool {
        self.0 == Expr::Literal(Value::Bool(false))
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        if value {
            Self::always()
        } else {
            Self::never()
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Condition::parse(&s).map_err(serde::de::Error::custom),
            other => Ok(Condition(Expr::Literal(other))),
        }
    }
}
