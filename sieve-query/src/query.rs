//! Query node model
//!
//! A [`Query`] is an immutable value: a [`QueryKind`] plus an optional display
//! label that the algebra never interprets. Composition always builds new
//! nodes; see [`crate::algebra`] for `simplify` and `negate`.
//!
//! # Wire shape
//!
//! The kind is flattened next to the label and tagged by `op`:
//!
//! ```json
//! {"op": "and", "label": "open tickets", "of": [
//!     {"op": "term", "field": "status", "value": "open"},
//!     {"op": "range", "field": "age", "gte": 18}
//! ]}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A query node with its optional label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// The variant and its payload
    #[serde(flatten)]
    pub kind: QueryKind,
    /// Free-form display metadata, never interpreted by the algebra
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Closed set of query variants.
///
/// `Not { of }` negates the implicit conjunction of its operands:
/// `Not([q1, q2])` is `¬(q1 ∧ q2)`, not `¬q1 ∨ ¬q2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryKind {
    /// Matches every document
    #[serde(rename = "all")]
    MatchAll,

    And {
        #[serde(default, deserialize_with = "one_or_many")]
        of: Vec<Query>,
    },

    Or {
        #[serde(default, deserialize_with = "one_or_many")]
        of: Vec<Query>,
    },

    Not {
        #[serde(default, deserialize_with = "one_or_many")]
        of: Vec<Query>,
    },

    /// Exact value match
    Term { field: String, value: Value },

    /// Match any of several exact values
    Terms {
        field: String,
        #[serde(rename = "value", default, deserialize_with = "one_or_many")]
        values: Vec<Value>,
    },

    /// Analyzed (full-text) match
    Match {
        field: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<MatchOperator>,
    },

    Regex { field: String, pattern: String },

    Prefix { field: String, value: String },

    /// Ordered sequence of terms
    Phrase {
        field: String,
        #[serde(rename = "value", default, deserialize_with = "one_or_many")]
        values: Vec<String>,
    },

    /// Field presence (`expected = false` means "field is missing")
    Exists {
        field: String,
        #[serde(default = "default_true")]
        expected: bool,
    },

    Range {
        field: String,
        #[serde(flatten)]
        bounds: RangeBounds,
    },

    DateRange {
        field: String,
        #[serde(flatten)]
        bounds: RangeBounds,
    },

    /// Geo bounding box
    Bbox { field: String, envelope: Envelope },

    /// Glob match with `*` and `?`
    Wildcard { field: String, pattern: String },

    /// Raw query-string syntax passed through to the backend
    Lucene {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_field: Option<String>,
    },

    /// Opaque backend-native clause
    Native { value: Value },

    /// Reference to a named query resolved by the backend
    Named {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

/// Operator joining the analyzed tokens of a `Match` query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    And,
    Or,
}

/// Bounds shared by `Range` and `DateRange`.
///
/// Absent bounds are omitted from the encoding rather than written as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl RangeBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lt(mut self, value: impl Into<Value>) -> Self {
        self.lt = Some(value.into());
        self
    }

    pub fn lte(mut self, value: impl Into<Value>) -> Self {
        self.lte = Some(value.into());
        self
    }

    pub fn gt(mut self, value: impl Into<Value>) -> Self {
        self.gt = Some(value.into());
        self
    }

    pub fn gte(mut self, value: impl Into<Value>) -> Self {
        self.gte = Some(value.into());
        self
    }

    pub fn time_zone(mut self, tz: impl Into<String>) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    /// True if no bound is set
    pub fn is_unbounded(&self) -> bool {
        self.lt.is_none() && self.lte.is_none() && self.gt.is_none() && self.gte.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Rectangle given by its top-left and bottom-right corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

fn default_true() -> bool {
    true
}

/// Accept either a single value or an array, normalizing to a list.
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

impl From<QueryKind> for Query {
    fn from(kind: QueryKind) -> Self {
        Self { kind, label: None }
    }
}

impl Query {
    pub fn match_all() -> Self {
        QueryKind::MatchAll.into()
    }

    /// Raw conjunction, not simplified. Prefer [`Query::and_of`] when composing.
    pub fn and(of: Vec<Query>) -> Self {
        QueryKind::And { of }.into()
    }

    /// Raw disjunction, not simplified. Prefer [`Query::or_of`] when composing.
    pub fn or(of: Vec<Query>) -> Self {
        QueryKind::Or { of }.into()
    }

    /// Negation of the conjunction of `of`
    pub fn not(of: Vec<Query>) -> Self {
        QueryKind::Not { of }.into()
    }

    /// Conjunction of the present inputs, simplified.
    ///
    /// `None` inputs are dropped, so optional clauses can be passed directly.
    pub fn and_of<I>(queries: I) -> Self
    where
        I: IntoIterator<Item = Option<Query>>,
    {
        Self::and(queries.into_iter().flatten().collect()).simplify()
    }

    /// Disjunction of the present inputs, simplified.
    pub fn or_of<I>(queries: I) -> Self
    where
        I: IntoIterator<Item = Option<Query>>,
    {
        Self::or(queries.into_iter().flatten().collect()).simplify()
    }

    /// Negated conjunction of the present inputs, simplified.
    pub fn not_of<I>(queries: I) -> Self
    where
        I: IntoIterator<Item = Option<Query>>,
    {
        Self::not(queries.into_iter().flatten().collect()).simplify()
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        QueryKind::Term {
            field: field.into(),
            value: value.into(),
        }
        .into()
    }

    pub fn terms<V>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        QueryKind::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
        .into()
    }

    pub fn match_text(field: impl Into<String>, value: impl Into<Value>) -> Self {
        QueryKind::Match {
            field: field.into(),
            value: value.into(),
            operator: None,
        }
        .into()
    }

    pub fn match_with_operator(
        field: impl Into<String>,
        value: impl Into<Value>,
        operator: MatchOperator,
    ) -> Self {
        QueryKind::Match {
            field: field.into(),
            value: value.into(),
            operator: Some(operator),
        }
        .into()
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        QueryKind::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
        .into()
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        QueryKind::Prefix {
            field: field.into(),
            value: value.into(),
        }
        .into()
    }

    pub fn phrase<S>(field: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        QueryKind::Phrase {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
        .into()
    }

    pub fn exists(field: impl Into<String>) -> Self {
        QueryKind::Exists {
            field: field.into(),
            expected: true,
        }
        .into()
    }

    /// Field absence, encoded as `Exists` with `expected = false`
    pub fn missing(field: impl Into<String>) -> Self {
        QueryKind::Exists {
            field: field.into(),
            expected: false,
        }
        .into()
    }

    pub fn range(field: impl Into<String>, bounds: RangeBounds) -> Self {
        QueryKind::Range {
            field: field.into(),
            bounds,
        }
        .into()
    }

    pub fn date_range(field: impl Into<String>, bounds: RangeBounds) -> Self {
        QueryKind::DateRange {
            field: field.into(),
            bounds,
        }
        .into()
    }

    pub fn bbox(field: impl Into<String>, envelope: Envelope) -> Self {
        QueryKind::Bbox {
            field: field.into(),
            envelope,
        }
        .into()
    }

    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        QueryKind::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
        }
        .into()
    }

    pub fn lucene(query: impl Into<String>, default_field: Option<String>) -> Self {
        QueryKind::Lucene {
            query: query.into(),
            default_field,
        }
        .into()
    }

    pub fn native(value: impl Into<Value>) -> Self {
        QueryKind::Native {
            value: value.into(),
        }
        .into()
    }

    pub fn named(name: impl Into<String>, value: Option<Value>) -> Self {
        QueryKind::Named {
            name: name.into(),
            value,
        }
        .into()
    }

    /// Attach a display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self.kind, QueryKind::MatchAll)
    }

    /// The field this node constrains, for fielded variants
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            QueryKind::Term { field, .. }
            | QueryKind::Terms { field, .. }
            | QueryKind::Match { field, .. }
            | QueryKind::Regex { field, .. }
            | QueryKind::Prefix { field, .. }
            | QueryKind::Phrase { field, .. }
            | QueryKind::Exists { field, .. }
            | QueryKind::Range { field, .. }
            | QueryKind::DateRange { field, .. }
            | QueryKind::Bbox { field, .. }
            | QueryKind::Wildcard { field, .. } => Some(field),
            QueryKind::MatchAll
            | QueryKind::And { .. }
            | QueryKind::Or { .. }
            | QueryKind::Not { .. }
            | QueryKind::Lucene { .. }
            | QueryKind::Native { .. }
            | QueryKind::Named { .. } => None,
        }
    }

    /// Operand list of `And`/`Or`/`Not` nodes
    pub fn operands(&self) -> Option<&[Query]> {
        match &self.kind {
            QueryKind::And { of } | QueryKind::Or { of } | QueryKind::Not { of } => Some(of),
            _ => None,
        }
    }
}
