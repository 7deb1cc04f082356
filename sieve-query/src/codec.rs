//! Wire encoding and decode-time validation

use crate::error::{QueryError, Result};
use crate::query::{Query, QueryKind, RangeBounds};
use serde_json::Value;

impl Query {
    /// Decode a query from JSON text and validate it.
    pub fn from_json(json: &str) -> Result<Query> {
        let query: Query = serde_json::from_str(json)?;
        query.validate()?;
        Ok(query)
    }

    /// Decode a query from a JSON value and validate it.
    pub fn from_value(value: Value) -> Result<Query> {
        let query: Query = serde_json::from_value(value)?;
        query.validate()?;
        Ok(query)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Check range bounds throughout the tree.
    ///
    /// Rejects a range with no bounds, with both `gt` and `gte` (or `lt` and
    /// `lte`), or whose numeric lower bound lies above its upper bound.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            QueryKind::And { of } | QueryKind::Or { of } | QueryKind::Not { of } => {
                of.iter().try_for_each(Query::validate)
            }
            QueryKind::Range { field, bounds } | QueryKind::DateRange { field, bounds } => {
                validate_bounds(field, bounds)
            }
            _ => Ok(()),
        }
    }
}

fn validate_bounds(field: &str, bounds: &RangeBounds) -> Result<()> {
    if bounds.is_unbounded() {
        return Err(QueryError::invalid_range(field, "no bound given"));
    }
    if bounds.gt.is_some() && bounds.gte.is_some() {
        return Err(QueryError::invalid_range(field, "both gt and gte given"));
    }
    if bounds.lt.is_some() && bounds.lte.is_some() {
        return Err(QueryError::invalid_range(field, "both lt and lte given"));
    }

    let lower = bounds.gt.as_ref().or(bounds.gte.as_ref()).and_then(Value::as_f64);
    let upper = bounds.lt.as_ref().or(bounds.lte.as_ref()).and_then(Value::as_f64);
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper {
            return Err(QueryError::invalid_range(
                field,
                format!("lower bound {} exceeds upper bound {}", lower, upper),
            ));
        }
    }
    Ok(())
}
