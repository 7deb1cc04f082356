//! Core policy records
//!
//! - `Statement`: effect, action/resource patterns, condition, scope rewrites
//! - `Rewrite`: a conditional query constraint injected on allow
//! - `Role`: statements, pulled-in policies, inherited roles, activation gate
//! - `Policy`: a named, reusable bundle of statements
//!
//! Defaults are applied when a record is built (by constructor or decode):
//! statement and rewrite conditions default to always-true, a role's
//! activation condition defaults to always-false, and a role's label defaults
//! to its id.

use serde::{Deserialize, Deserializer, Serialize};
use sieve_expr::{Condition, Expr};

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[serde(alias = "Allow")]
    Allow,
    #[serde(alias = "Deny")]
    Deny,
}

/// One access-control rule.
///
/// An empty `actions` or `resource` list matches nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub effect: Effect,
    /// Glob patterns over `service:verb` action names
    #[serde(default, deserialize_with = "one_or_many")]
    pub actions: Vec<String>,
    /// Glob patterns over resource identifiers such as `collection/id`
    #[serde(default, deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
    #[serde(default = "Condition::always")]
    pub condition: Condition,
    /// Constraints injected into the caller's query when this statement allows
    #[serde(default)]
    pub scope: Vec<Rewrite>,
}

impl Statement {
    fn with_effect<A, R>(effect: Effect, actions: A, resource: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            id: None,
            effect,
            actions: actions.into_iter().map(Into::into).collect(),
            resource: resource.into_iter().map(Into::into).collect(),
            condition: Condition::always(),
            scope: Vec::new(),
        }
    }

    pub fn allow<A, R>(actions: A, resource: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self::with_effect(Effect::Allow, actions, resource)
    }

    pub fn deny<A, R>(actions: A, resource: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self::with_effect(Effect::Deny, actions, resource)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.scope.push(rewrite);
        self
    }
}

/// "When `condition` holds, constrain `key` to the evaluated `value`."
///
/// `replace = true` overwrites an existing top-level constraint on `key`;
/// otherwise the constraint is ANDed onto the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rewrite {
    pub key: String,
    pub value: Expr,
    #[serde(default)]
    pub replace: bool,
    #[serde(default = "Condition::always")]
    pub condition: Condition,
}

impl Rewrite {
    /// Merging rewrite with an always-true condition
    pub fn new(key: impl Into<String>, value: Expr) -> Self {
        Self {
            key: key.into(),
            value,
            replace: false,
            condition: Condition::always(),
        }
    }

    /// Replacing rewrite with an always-true condition
    pub fn replacing(key: impl Into<String>, value: Expr) -> Self {
        Self {
            replace: true,
            ..Self::new(key, value)
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }
}

/// A named bundle of statements with an activation gate.
///
/// `condition` defaults to never: a role contributes nothing until the caller
/// shows that it applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RoleDocument")]
pub struct Role {
    pub id: String,
    pub label: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Expr>,
    pub policies: Vec<String>,
    pub inherits: Vec<String>,
    pub statements: Vec<Statement>,
    /// Higher wins when ordering scope rewrites
    pub priority: i32,
    pub condition: Condition,
}

/// Decoded form of a role before defaults are applied
#[derive(Deserialize)]
struct RoleDocument {
    id: String,
    #[serde(default)]
    label: Option<Expr>,
    #[serde(default)]
    summary: Option<Expr>,
    #[serde(default, deserialize_with = "one_or_many")]
    policies: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    inherits: Vec<String>,
    #[serde(default)]
    statements: Vec<Statement>,
    #[serde(default)]
    priority: i32,
    #[serde(default = "Condition::never")]
    condition: Condition,
}

impl From<RoleDocument> for Role {
    fn from(doc: RoleDocument) -> Self {
        let label = doc
            .label
            .unwrap_or_else(|| Expr::literal(doc.id.clone()));
        Self {
            id: doc.id,
            label,
            summary: doc.summary,
            policies: doc.policies,
            inherits: doc.inherits,
            statements: doc.statements,
            priority: doc.priority,
            condition: doc.condition,
        }
    }
}

impl Role {
    /// Role labelled with its id, priority 0, never active
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: Expr::literal(id.clone()),
            id,
            summary: None,
            policies: Vec::new(),
            inherits: Vec::new(),
            statements: Vec::new(),
            priority: 0,
            condition: Condition::never(),
        }
    }

    pub fn with_label(mut self, label: Expr) -> Self {
        self.label = label;
        self
    }

    pub fn with_summary(mut self, summary: Expr) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.policies.push(policy_id.into());
        self
    }

    pub fn with_inherits(mut self, role_id: impl Into<String>) -> Self {
        self.inherits.push(role_id.into());
        self
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }
}

/// Reusable statement bundle referenced by `Role::policies`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl Policy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            statements: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<String>),
        One(String),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_statement_defaults() {
        let stmt: Statement = serde_json::from_value(json!({
            "effect": "allow",
            "actions": "search:*",
            "resource": ["docs/*"]
        }))
        .unwrap();
        assert_eq!(stmt.effect, Effect::Allow);
        assert_eq!(stmt.actions, vec!["search:*"]);
        assert!(stmt.condition.is_always());
        assert!(stmt.scope.is_empty());
        assert!(stmt.id.is_none());
    }

    #[test]
    fn test_effect_accepts_capitalized() {
        let stmt: Statement =
            serde_json::from_value(json!({"effect": "Deny", "actions": ["a"], "resource": ["r"]}))
                .unwrap();
        assert_eq!(stmt.effect, Effect::Deny);
    }

    #[test]
    fn test_rewrite_defaults() {
        let rewrite: Rewrite =
            serde_json::from_value(json!({"key": "tenant", "value": "${user:org}"})).unwrap();
        assert!(!rewrite.replace);
        assert!(rewrite.condition.is_always());
        assert!(matches!(rewrite.value, Expr::Reference(_)));
    }

    #[test]
    fn test_role_defaults_applied_on_decode() {
        let role: Role = serde_json::from_value(json!({"id": "reader"})).unwrap();
        assert_eq!(role.label, Expr::literal("reader"));
        assert!(role.condition.is_never());
        assert_eq!(role.priority, 0);
        assert!(role.inherits.is_empty());
        assert_eq!(role, Role::new("reader"));
    }

    #[test]
    fn test_role_explicit_fields() {
        let role: Role = serde_json::from_value(json!({
            "id": "editor",
            "label": "Editor of ${user:org}",
            "inherits": "reader",
            "policies": ["base"],
            "priority": 5,
            "condition": "${user:groups | contains:editors}"
        }))
        .unwrap();
        assert!(matches!(role.label, Expr::Template(_)));
        assert_eq!(role.inherits, vec!["reader"]);
        assert_eq!(role.policies, vec!["base"]);
        assert_eq!(role.priority, 5);
        assert!(!role.condition.is_never());
    }

    #[test]
    fn test_bad_condition_is_decode_error() {
        let result = serde_json::from_value::<Statement>(json!({
            "effect": "allow", "actions": ["a"], "resource": ["r"], "condition": "${broken"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_builders() {
        let stmt = Statement::allow(["search:*"], ["docs/*"])
            .with_id("s1")
            .with_rewrite(Rewrite::replacing("tenant", Expr::literal("acme")));
        assert_eq!(stmt.id.as_deref(), Some("s1"));
        assert!(stmt.scope[0].replace);

        let role = Role::new("r").with_priority(3).with_inherits("base");
        assert_eq!(role.priority, 3);
        assert_eq!(role.inherits, vec!["base"]);
    }
}
