//! End-to-end authorization through `PolicyEngine`.


use chrono::{TimeZone, Utc};
use serde_json::json;
use sieve_expr::{Context, Evaluator, FixedClock, KeyResolver};
use sieve_policy::{
    AccessRequest, Authorization, Decision, DenyReason, EngineConfig, PolicyEngine, PolicyError,
    Rewrite, Role, StaticPolicySource, Statement,
};
use sieve_query::Query;
use tracing_test_utils::init_test_tracing;

fn make_engine(doc: serde_json::Value) -> PolicyEngine<StaticPolicySource> {
    PolicyEngine::new(StaticPolicySource::from_value(doc).unwrap())
}

fn tenant_scoped_role() -> serde_json::Value {
    json!({
        "roles": [{
            "id": "searcher",
            "priority": 1,
            "condition": true,
            "statements": [{
                "effect": "allow",
                "actions": ["search:*"],
                "resource": ["docs/*"],
                "scope": [{"key": "tenant", "value": "acme", "replace": true}]
            }]
        }]
    })
}

#[test]
fn tenant_scope_is_folded_into_query() {
    let engine = make_engine(tenant_scoped_role());
    let request = AccessRequest::new("search:query", "docs/42")
        .with_role("searcher")
        .with_query(Query::term("status", "open"));

    let auth = engine.authorize(&request).unwrap();
    let expected = Query::and(vec![
        Query::term("status", "open"),
        Query::term("tenant", "acme"),
    ])
    .simplify();
    assert_eq!(auth, Authorization::Granted(expected));
}

#[test]
fn replacing_scope_overrides_caller_tenant() {
    let engine = make_engine(tenant_scoped_role());
    let request = AccessRequest::new("search:query", "docs/42")
        .with_role("searcher")
        .with_query(Query::and(vec![
            Query::term("tenant", "other"),
            Query::term("status", "open"),
        ]));

    let query = engine.authorize(&request).unwrap().query().cloned().unwrap();
    assert_eq!(
        query,
        Query::and(vec![
            Query::term("status", "open"),
            Query::term("tenant", "acme"),
        ])
    );
}

#[test]
fn deny_overrides_allow_across_policies() {
    let engine = make_engine(json!({
        "policies": [
            {"id": "read-all", "statements": [
                {"effect": "allow", "actions": ["search:*"], "resource": ["*"],
                 "scope": [{"key": "tenant", "value": "acme"}]}
            ]},
            {"id": "no-secrets", "statements": [
                {"id": "block-secrets", "effect": "deny", "actions": ["*"], "resource": ["secrets/*"]}
            ]}
        ],
        "roles": [
            {"id": "analyst", "condition": true, "policies": ["read-all", "no-secrets"]}
        ]
    }));

    let request = AccessRequest::new("search:query", "secrets/launch-codes").with_role("analyst");
    let evaluation = engine.evaluate(&request).unwrap();
    assert_eq!(
        evaluation.decision,
        Decision::Deny {
            statement: "block-secrets".into()
        }
    );
    assert!(evaluation.rewrites.is_empty());

    let denial = engine.authorize(&request).unwrap().denial().cloned().unwrap();
    assert_eq!(
        denial.reason,
        DenyReason::Explicit {
            statement: "block-secrets".into()
        }
    );

    let allowed = AccessRequest::new("search:query", "docs/1").with_role("analyst");
    assert!(engine.authorize(&allowed).unwrap().is_granted());
}

#[test]
fn implicit_deny_without_matching_statement_or_role() {
    let engine = make_engine(tenant_scoped_role());

    let no_role = AccessRequest::new("search:query", "docs/1");
    let denial = engine.authorize(&no_role).unwrap().denial().cloned().unwrap();
    assert_eq!(denial.reason, DenyReason::NoActiveRole);

    let no_match = AccessRequest::new("admin:drop", "docs/1").with_role("searcher");
    let evaluation = engine.evaluate(&no_match).unwrap();
    assert_eq!(evaluation.decision, Decision::Implicit);
    assert!(evaluation.rewrites.is_empty());
    assert_eq!(
        engine.authorize(&no_match).unwrap().denial().unwrap().reason,
        DenyReason::Implicit
    );
}

#[test]
fn inherited_statements_apply_with_active_role() {
    let engine = make_engine(json!({
        "roles": [
            {"id": "viewer", "statements": [
                {"effect": "allow", "actions": ["search:query"], "resource": ["docs/*"]}
            ]},
            {"id": "editor", "condition": "${user:groups | contains:editors}",
             "inherits": ["viewer"],
             "statements": [
                {"effect": "allow", "actions": ["docs:write"], "resource": ["docs/*"]}
             ]}
        ]
    }));
    let ctx = Context::new().with("user", json!({"groups": ["editors"]}));

    let read = AccessRequest::new("search:query", "docs/7")
        .with_role("editor")
        .with_context(ctx.clone());
    assert!(engine.authorize(&read).unwrap().is_granted());

    // viewer's own gate is never-true; it contributes only through editor
    let direct = AccessRequest::new("search:query", "docs/7")
        .with_role("viewer")
        .with_context(ctx);
    assert_eq!(
        engine.authorize(&direct).unwrap().denial().unwrap().reason,
        DenyReason::NoActiveRole
    );
}

#[test]
fn inheritance_cycle_is_configuration_error() {
    let engine = make_engine(json!({
        "roles": [
            {"id": "a", "condition": true, "inherits": ["b"]},
            {"id": "b", "inherits": ["c"]},
            {"id": "c", "inherits": ["a"]}
        ]
    }));
    let err = engine
        .authorize(&AccessRequest::new("x", "y").with_role("a"))
        .unwrap_err();
    assert!(err.is_configuration());
    match err {
        PolicyError::InheritanceCycle { path } => assert_eq!(path, "a -> b -> c -> a"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn lenient_config_skips_dangling_references() {
    let doc = json!({
        "roles": [{"id": "r", "condition": true, "inherits": ["gone"],
                   "statements": [{"effect": "allow", "actions": ["*"], "resource": ["*"]}]}]
    });
    let request = AccessRequest::new("x", "y").with_role("r");

    let strict = make_engine(doc.clone());
    assert!(matches!(
        strict.authorize(&request),
        Err(PolicyError::UnknownRole { .. })
    ));

    let config = EngineConfig::from_toml("[policy]\nstrict_references = false").unwrap();
    let lenient = make_engine(doc).with_config(config);
    assert!(lenient.authorize(&request).unwrap().is_granted());
}

#[test]
fn repeated_scope_is_applied_once() {
    let rewrite = Rewrite::new("tenant", sieve_expr::Expr::literal("acme"));
    let source = StaticPolicySource::new(
        vec![],
        vec![
            Role::new("a").with_condition(true.into()).with_statement(
                Statement::allow(["*"], ["*"]).with_rewrite(rewrite.clone()),
            ),
            Role::new("b")
                .with_condition(true.into())
                .with_statement(Statement::allow(["*"], ["*"]).with_rewrite(rewrite)),
        ],
    )
    .unwrap();
    let engine = PolicyEngine::new(source);
    let raw = Query::term("status", "open");

    let once = engine
        .authorize(&AccessRequest::new("x", "y").with_role("a").with_query(raw.clone()))
        .unwrap();
    let twice = engine
        .authorize(&AccessRequest::new("x", "y").with_roles(["a", "b"]).with_query(raw))
        .unwrap();
    assert_eq!(
        once.query().map(Query::simplify),
        twice.query().map(Query::simplify)
    );
}

fn replacing_role(id: &str, priority: i32, tenant: &str) -> serde_json::Value {
    json!({
        "id": id,
        "priority": priority,
        "condition": true,
        "statements": [{
            "effect": "allow", "actions": ["*"], "resource": ["*"],
            "scope": [{"key": "tenant", "value": tenant, "replace": true}]
        }]
    })
}

#[test]
fn higher_priority_replace_wins() {
    let engine = make_engine(json!({
        "roles": [
            replacing_role("guest", 1, "guest-scope"),
            replacing_role("admin", 10, "admin-scope")
        ]
    }));

    for roles in [["admin", "guest"], ["guest", "admin"]] {
        let request = AccessRequest::new("search:query", "docs/1").with_roles(roles);
        assert_eq!(
            engine.authorize(&request).unwrap().query(),
            Some(&Query::term("tenant", "admin-scope")),
            "{roles:?}"
        );
    }
}

#[test]
fn equal_priority_ignores_candidate_order() {
    let engine = make_engine(json!({
        "roles": [
            replacing_role("first", 0, "first-scope"),
            replacing_role("second", 0, "second-scope")
        ]
    }));
    let raw = Query::term("tenant", "caller");

    let forward = AccessRequest::new("search:query", "docs/1")
        .with_roles(["first", "second"])
        .with_query(raw.clone());
    let reversed = AccessRequest::new("search:query", "docs/1")
        .with_roles(["second", "first"])
        .with_query(raw);

    let expected = Authorization::Granted(Query::term("tenant", "first-scope"));
    assert_eq!(engine.authorize(&forward).unwrap(), expected);
    assert_eq!(engine.authorize(&reversed).unwrap(), expected);
    assert_eq!(
        engine.evaluate(&reversed).unwrap().matched,
        vec!["first#0", "second#0"]
    );
}

#[test]
fn time_gated_role_uses_injected_clock() {
    let doc = json!({
        "roles": [{
            "id": "trial",
            "condition": "${user:signed_up | since | lt:86400}",
            "statements": [{"effect": "allow", "actions": ["search:*"], "resource": ["*"]}]
        }]
    });
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let engine = make_engine(doc).with_evaluator(Evaluator::new().with_clock(FixedClock(now)));

    let fresh = Context::new().with("user", json!({"signed_up": "2024-06-01T08:00:00Z"}));
    let stale = Context::new().with("user", json!({"signed_up": "2024-05-01T08:00:00Z"}));

    let request = AccessRequest::new("search:query", "docs/1").with_role("trial");
    assert!(engine
        .authorize(&request.clone().with_context(fresh))
        .unwrap()
        .is_granted());
    assert!(!engine
        .authorize(&request.with_context(stale))
        .unwrap()
        .is_granted());
}

struct Directory;

impl KeyResolver for Directory {
    fn resolve(&self, _namespace: &str, key: &str, ctx: &Context) -> sieve_expr::Result<serde_json::Value> {
        let user = ctx.lookup("user", "id").cloned().unwrap_or_default();
        match (key, user.as_str()) {
            ("tenants", Some("u1")) => Ok(json!(["acme", "globex"])),
            ("tenants", _) => Ok(json!([])),
            _ => Err(sieve_expr::ExprError::resolve("directory", key, "unknown key")),
        }
    }
}

#[test]
fn rewrite_values_come_from_custom_resolver() {
    let engine = make_engine(json!({
        "roles": [{
            "id": "member",
            "condition": true,
            "statements": [{
                "effect": "allow", "actions": ["search:*"], "resource": ["*"],
                "scope": [{"key": "tenant", "value": "${directory:tenants}"}]
            }]
        }]
    }))
    .with_evaluator(Evaluator::new().with_resolver("directory", Directory));

    let request = AccessRequest::new("search:query", "docs/1")
        .with_role("member")
        .with_context(Context::new().with("user", json!({"id": "u1"})));
    assert_eq!(
        engine.authorize(&request).unwrap().query(),
        Some(&Query::terms("tenant", ["acme", "globex"]))
    );

    // no tenants collapses to a null-valued term
    let outsider = request.with_context(Context::new().with("user", json!({"id": "u2"})));
    assert_eq!(
        engine.authorize(&outsider).unwrap().query(),
        Some(&Query::term("tenant", serde_json::Value::Null))
    );
}

#[test]
fn failing_rewrite_value_is_an_error() {
    let engine = make_engine(json!({
        "roles": [{
            "id": "member",
            "condition": true,
            "statements": [{
                "effect": "allow", "actions": ["*"], "resource": ["*"],
                "scope": [{"key": "tenant", "value": "${directory:missing}"}]
            }]
        }]
    }))
    .with_evaluator(Evaluator::new().with_resolver("directory", Directory));

    let err = engine
        .authorize(&AccessRequest::new("a", "b").with_role("member"))
        .unwrap_err();
    assert!(matches!(err, PolicyError::RewriteEvaluation { .. }));
}

#[test]
fn authorize_records_decision_on_span() {
    let (store, _guard) = init_test_tracing();
    let engine = make_engine(tenant_scoped_role());

    engine
        .authorize(&AccessRequest::new("search:query", "docs/1").with_role("searcher"))
        .unwrap();
    engine
        .authorize(&AccessRequest::new("admin:drop", "docs/1").with_role("searcher"))
        .unwrap();

    let first = store.find_span("policy_authorize").unwrap();
    assert_eq!(first.fields.get("action").unwrap(), "search:query");
    assert_eq!(first.fields.get("decision").unwrap(), "allow");

    let spans = store.find_spans("policy_authorize");
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[1].fields.get("decision").unwrap(), "deny");
}
