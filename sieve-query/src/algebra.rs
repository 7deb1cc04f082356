//! Query algebra: structural simplification and negation
//!
//! # Simplify
//!
//! One pass of normalization, recursing into operands:
//! - `And`: flatten nested `And`, drop `MatchAll` (identity). Empty becomes
//!   `MatchAll`, a single operand becomes that operand.
//! - `Or`: flatten nested `Or`; any `MatchAll` operand absorbs the whole
//!   disjunction. Empty becomes `MatchAll`, a single operand becomes that operand.
//! - `Not`: operands are simplified in place, the wrapper is kept.
//! - `Terms` with fewer than two values collapses to `Term` (null-valued when empty).
//!
//! # Negate
//!
//! De Morgan for `And`/`Or`. `Not(of)` negates to `And(of)` with the operands
//! left untouched. Every other variant is wrapped as `Not([self])`.

use crate::query::{Query, QueryKind};
use serde_json::Value;

impl Query {
    /// Structural normalization. Total; never fails.
    pub fn simplify(&self) -> Query {
        let label = self.label.clone();
        match &self.kind {
            QueryKind::And { of } => {
                let mut operands = Vec::with_capacity(of.len());
                for operand in of {
                    let simplified = operand.simplify();
                    match simplified.kind {
                        QueryKind::MatchAll => {}
                        QueryKind::And { of: nested } => operands.extend(nested),
                        _ => operands.push(simplified),
                    }
                }
                collapse(operands, label, |of| QueryKind::And { of })
            }
            QueryKind::Or { of } => {
                let mut operands = Vec::with_capacity(of.len());
                for operand in of {
                    let simplified = operand.simplify();
                    match simplified.kind {
                        QueryKind::MatchAll => return Query::match_all(),
                        QueryKind::Or { of: nested } => operands.extend(nested),
                        _ => operands.push(simplified),
                    }
                }
                collapse(operands, label, |of| QueryKind::Or { of })
            }
            QueryKind::Not { of } => Query {
                kind: QueryKind::Not {
                    of: of.iter().map(Query::simplify).collect(),
                },
                label,
            },
            QueryKind::Terms { field, values } if values.len() < 2 => Query {
                kind: QueryKind::Term {
                    field: field.clone(),
                    value: values.first().cloned().unwrap_or(Value::Null),
                },
                label,
            },
            _ => self.clone(),
        }
    }

    /// Algebraic complement.
    pub fn negate(&self) -> Query {
        match &self.kind {
            QueryKind::And { of } => Query {
                kind: QueryKind::Or {
                    of: of.iter().map(Query::negate).collect(),
                },
                label: self.label.clone(),
            },
            QueryKind::Or { of } => Query {
                kind: QueryKind::And {
                    of: of.iter().map(Query::negate).collect(),
                },
                label: self.label.clone(),
            },
            // Not(of) already denotes ¬AND(of)
            QueryKind::Not { of } => Query {
                kind: QueryKind::And { of: of.clone() },
                label: self.label.clone(),
            },
            _ => Query::not(vec![self.clone()]),
        }
    }
}

fn collapse(
    mut operands: Vec<Query>,
    label: Option<String>,
    wrap: impl FnOnce(Vec<Query>) -> QueryKind,
) -> Query {
    match operands.len() {
        0 => Query::match_all(),
        1 => operands.pop().unwrap_or_else(Query::match_all),
        _ => Query {
            kind: wrap(operands),
            label,
        },
    }
}
