//! Query authorization
//!
//! Folds the rewrites of an allow decision into the caller's query. Each
//! rewrite value is evaluated and turned into a constraint by its shape:
//!
//! | Evaluated value                         | Constraint                     |
//! |-----------------------------------------|--------------------------------|
//! | array                                   | `Terms` (simplified)           |
//! | `null`                                  | `Exists` with `expected=false` |
//! | object with an `op` member              | the decoded query              |
//! | object with only `exists`               | `Exists`                       |
//! | object with only `lt/lte/gt/gte/time_zone` | `Range`                     |
//! | any other scalar                        | `Term`                         |
//!
//! A replacing rewrite drops the top-level conjuncts on the same field before
//! adding its constraint; later replacing rewrites on that key are skipped.
//! A merging rewrite is ANDed on, minus the conjuncts the query already
//! carries. The tree is simplified after every step.

use crate::error::{PolicyError, Result};
use crate::types::Rewrite;
use serde_json::{Map, Value};
use sieve_expr::{Context, Evaluator};
use sieve_query::{Query, QueryKind, RangeBounds};
use std::collections::HashSet;
use tracing::trace;

const RANGE_KEYS: [&str; 5] = ["lt", "lte", "gt", "gte", "time_zone"];

/// Merges rewrites into a query
#[derive(Debug, Clone, Copy)]
pub struct QueryAuthorizer<'a> {
    evaluator: &'a Evaluator,
    dedupe_constraints: bool,
}

impl<'a> QueryAuthorizer<'a> {
    pub fn new(evaluator: &'a Evaluator) -> Self {
        Self {
            evaluator,
            dedupe_constraints: true,
        }
    }

    pub fn with_dedupe_constraints(mut self, dedupe: bool) -> Self {
        self.dedupe_constraints = dedupe;
        self
    }

    /// Apply `rewrites` in order to `query`.
    ///
    /// Rewrites arrive highest precedence first, so only the first replacing
    /// rewrite for a key takes effect.
    pub fn apply(&self, query: &Query, rewrites: &[Rewrite], ctx: &Context) -> Result<Query> {
        let mut result = query.simplify();
        let mut replaced = HashSet::new();
        for rewrite in rewrites {
            if rewrite.replace && replaced.contains(rewrite.key.as_str()) {
                trace!(key = %rewrite.key, "Skipping lower-precedence replace");
                continue;
            }
            let value = self
                .evaluator
                .evaluate(&rewrite.value, ctx)
                .map_err(|e| PolicyError::rewrite(&rewrite.key, e))?;
            let constraint = constraint_for(&rewrite.key, value)?;
            trace!(key = %rewrite.key, replace = rewrite.replace, "Applying rewrite");
            result = if rewrite.replace {
                replaced.insert(rewrite.key.as_str());
                replace_constraint(result, &rewrite.key, constraint)
            } else {
                self.merge_constraint(result, constraint)
            };
        }
        Ok(result)
    }

    fn merge_constraint(&self, query: Query, constraint: Query) -> Query {
        if !self.dedupe_constraints {
            return Query::and_of([Some(query), Some(constraint)]);
        }
        let constraint = constraint.simplify();
        let existing = conjuncts(&query);
        let fresh: Vec<Query> = conjuncts(&constraint)
            .iter()
            .filter(|c| !existing.iter().any(|q| q.kind == c.kind))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return query;
        }
        Query::and_of(std::iter::once(Some(query)).chain(fresh.into_iter().map(Some)))
    }
}

/// Build the constraint for `key` from an evaluated rewrite value
pub fn constraint_for(key: &str, value: Value) -> Result<Query> {
    match value {
        Value::Array(values) => Ok(Query::terms(key, values).simplify()),
        Value::Null => Ok(Query::missing(key)),
        Value::Object(map) => object_constraint(key, map),
        scalar => Ok(Query::term(key, scalar)),
    }
}

fn object_constraint(key: &str, map: Map<String, Value>) -> Result<Query> {
    if map.contains_key("op") {
        return Ok(Query::from_value(Value::Object(map))?);
    }

    if map.len() == 1 {
        if let Some(expected) = map.get("exists") {
            return match expected {
                Value::Bool(true) => Ok(Query::exists(key)),
                Value::Bool(false) => Ok(Query::missing(key)),
                other => Err(PolicyError::invalid_constraint(
                    key,
                    format!("exists must be a boolean, got {other}"),
                )),
            };
        }
    }

    if !map.is_empty() && map.keys().all(|k| RANGE_KEYS.contains(&k.as_str())) {
        let bounds: RangeBounds = serde_json::from_value(Value::Object(map))?;
        let range = Query::range(key, bounds);
        range.validate()?;
        return Ok(range);
    }

    Err(PolicyError::invalid_constraint(
        key,
        "object value needs an op, an exists flag, or range bounds",
    ))
}

/// Top-level conjuncts of a simplified query
fn conjuncts(query: &Query) -> &[Query] {
    match &query.kind {
        QueryKind::And { of } => of,
        _ => std::slice::from_ref(query),
    }
}

fn replace_constraint(query: Query, key: &str, constraint: Query) -> Query {
    if query.field() == Some(key) {
        return constraint;
    }
    match query.kind {
        QueryKind::And { of } => {
            let kept = of.into_iter().filter(|q| q.field() != Some(key));
            let operands: Vec<Query> = kept.chain(std::iter::once(constraint)).collect();
            Query {
                kind: QueryKind::And { of: operands },
                label: query.label,
            }
            .simplify()
        }
        kind => Query::and_of([
            Some(Query {
                kind,
                label: query.label,
            }),
            Some(constraint),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sieve_expr::Expr;

    fn apply(query: &Query, rewrites: &[Rewrite]) -> Query {
        let evaluator = Evaluator::new();
        QueryAuthorizer::new(&evaluator)
            .apply(query, rewrites, &Context::new())
            .unwrap()
    }

    #[test]
    fn test_replace_adds_missing_field() {
        let raw = Query::term("status", "open");
        let out = apply(&raw, &[Rewrite::replacing("tenant", Expr::literal("acme"))]);
        assert_eq!(
            out,
            Query::and(vec![
                Query::term("status", "open"),
                Query::term("tenant", "acme")
            ])
            .simplify()
        );
    }

    #[test]
    fn test_replace_overwrites_existing_field() {
        let raw = Query::and(vec![
            Query::term("tenant", "evil"),
            Query::term("status", "open"),
        ]);
        let out = apply(&raw, &[Rewrite::replacing("tenant", Expr::literal("acme"))]);
        assert_eq!(
            out,
            Query::and(vec![
                Query::term("status", "open"),
                Query::term("tenant", "acme")
            ])
        );
    }

    #[test]
    fn test_replace_root_fielded_node() {
        let raw = Query::terms("tenant", ["a", "b"]);
        let out = apply(&raw, &[Rewrite::replacing("tenant", Expr::literal("acme"))]);
        assert_eq!(out, Query::term("tenant", "acme"));
    }

    #[test]
    fn test_replace_leaves_nested_constraints() {
        let nested = Query::or(vec![Query::term("tenant", "x"), Query::term("a", 1)]);
        let raw = Query::and(vec![nested.clone(), Query::term("b", 2)]);
        let out = apply(&raw, &[Rewrite::replacing("tenant", Expr::literal("acme"))]);
        assert_eq!(
            out,
            Query::and(vec![nested, Query::term("b", 2), Query::term("tenant", "acme")])
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let raw = Query::term("status", "open");
        let rewrite = Rewrite::new("tenant", Expr::literal("acme"));
        let once = apply(&raw, std::slice::from_ref(&rewrite));
        let twice = apply(&raw, &[rewrite.clone(), rewrite]);
        assert_eq!(once.simplify(), twice.simplify());
    }

    #[test]
    fn test_first_replace_per_key_wins() {
        let raw = Query::term("tenant", "caller");
        let out = apply(
            &raw,
            &[
                Rewrite::replacing("tenant", Expr::literal("admin-scope")),
                Rewrite::replacing("tenant", Expr::literal("guest-scope")),
            ],
        );
        assert_eq!(out, Query::term("tenant", "admin-scope"));
    }

    #[test]
    fn test_merge_after_replace_still_narrows() {
        let out = apply(
            &Query::match_all(),
            &[
                Rewrite::replacing("tenant", Expr::literal("acme")),
                Rewrite::new("tenant", Expr::literal(json!(["acme", "globex"]))),
            ],
        );
        assert_eq!(
            out,
            Query::and(vec![
                Query::term("tenant", "acme"),
                Query::terms("tenant", ["acme", "globex"])
            ])
        );
    }

    #[test]
    fn test_compound_merge_is_idempotent() {
        let raw = Query::term("status", "open");
        let rewrite = Rewrite::new(
            "scope",
            Expr::literal(json!({"op": "and", "of": [
                {"op": "term", "field": "tenant", "value": "acme"},
                {"op": "exists", "field": "owner"}
            ]})),
        );
        let once = apply(&raw, std::slice::from_ref(&rewrite));
        let twice = apply(&raw, &[rewrite.clone(), rewrite]);
        assert_eq!(once.simplify(), twice.simplify());
        assert_eq!(once.operands().map(<[Query]>::len), Some(3));
    }

    #[test]
    fn test_compound_merge_adds_only_missing_conjuncts() {
        let raw = Query::and(vec![Query::term("status", "open"), Query::exists("owner")]);
        let rewrite = Rewrite::new(
            "scope",
            Expr::literal(json!({"op": "and", "of": [
                {"op": "term", "field": "tenant", "value": "acme"},
                {"op": "exists", "field": "owner"}
            ]})),
        );
        let out = apply(&raw, &[rewrite]);
        assert_eq!(
            out,
            Query::and(vec![
                Query::term("status", "open"),
                Query::exists("owner"),
                Query::term("tenant", "acme")
            ])
        );
    }

    #[test]
    fn test_merge_without_dedupe_keeps_duplicates() {
        let evaluator = Evaluator::new();
        let rewrite = Rewrite::new("tenant", Expr::literal("acme"));
        let out = QueryAuthorizer::new(&evaluator)
            .with_dedupe_constraints(false)
            .apply(&Query::match_all(), &[rewrite.clone(), rewrite], &Context::new())
            .unwrap();
        assert_eq!(out.operands().map(<[Query]>::len), Some(2));
    }

    #[test]
    fn test_merge_onto_match_all() {
        let out = apply(&Query::match_all(), &[Rewrite::new("tenant", Expr::literal("acme"))]);
        assert_eq!(out, Query::term("tenant", "acme"));
    }

    #[test]
    fn test_rewrite_value_from_context() {
        let evaluator = Evaluator::new();
        let ctx = Context::new().with("user", json!({"org": "acme", "teams": ["a", "b"]}));
        let rewrites = vec![
            Rewrite::new("tenant", Expr::parse("${user:org}").unwrap()),
            Rewrite::new("team", Expr::parse("${user:teams}").unwrap()),
        ];
        let out = QueryAuthorizer::new(&evaluator)
            .apply(&Query::match_all(), &rewrites, &ctx)
            .unwrap();
        assert_eq!(
            out,
            Query::and(vec![
                Query::term("tenant", "acme"),
                Query::terms("team", ["a", "b"])
            ])
        );
    }

    #[test]
    fn test_rewrite_evaluation_error() {
        let evaluator = Evaluator::new();
        let rewrite = Rewrite::new("n", Expr::parse("${user:n | nosuchpipe}").unwrap());
        let err = QueryAuthorizer::new(&evaluator)
            .apply(&Query::match_all(), &[rewrite], &Context::new())
            .unwrap_err();
        assert!(matches!(err, PolicyError::RewriteEvaluation { ref key, .. } if key == "n"));
    }

    #[test]
    fn test_constraint_shapes() {
        assert_eq!(constraint_for("f", json!("x")).unwrap(), Query::term("f", "x"));
        assert_eq!(constraint_for("f", json!([1])).unwrap(), Query::term("f", 1));
        assert_eq!(constraint_for("f", json!([1, 2])).unwrap(), Query::terms("f", [1, 2]));
        assert_eq!(constraint_for("f", Value::Null).unwrap(), Query::missing("f"));
        assert_eq!(
            constraint_for("f", json!({"exists": true})).unwrap(),
            Query::exists("f")
        );
        assert_eq!(
            constraint_for("f", json!({"gte": 1, "lt": 5})).unwrap(),
            Query::range("f", RangeBounds::new().gte(1).lt(5))
        );
        assert_eq!(
            constraint_for("ignored", json!({"op": "prefix", "field": "path", "value": "/a"}))
                .unwrap(),
            Query::prefix("path", "/a")
        );
    }

    #[test]
    fn test_invalid_constraint_shapes() {
        assert!(matches!(
            constraint_for("f", json!({"unknown": 1})),
            Err(PolicyError::InvalidConstraint { .. })
        ));
        assert!(matches!(
            constraint_for("f", json!({"exists": "yes"})),
            Err(PolicyError::InvalidConstraint { .. })
        ));
        assert!(matches!(
            constraint_for("f", json!({"gt": 9, "lt": 1})),
            Err(PolicyError::Query(_))
        ));
        assert!(matches!(
            constraint_for("f", json!({"op": "nope"})),
            Err(PolicyError::Query(_))
        ));
    }
}
