//! Expression syntax
//!
//! An expression is one of:
//! - a JSON literal (any non-string value, or a string without `${`)
//! - a single reference `${namespace:key | pipe:arg1:arg2 | ...}`, which keeps
//!   the JSON type of the resolved value
//! - a template mixing text and references, which always yields a string
//!
//! Pipe arguments are separated by `:`. Wrap an argument in single quotes to
//! include `:`, `|` or `}` in it: `${user:joined | date:'%H:%M'}`.

use crate::error::{ExprError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Reference(Reference),
    Template(Vec<Segment>),
}

/// `${namespace:key | pipes...}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reference {
    pub namespace: String,
    pub key: String,
    pub pipes: Vec<PipeCall>,
}

/// One `name:arg:arg` stage of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipeCall {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Reference(Reference),
}

impl Expr {
    /// Constant expression
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Parse expression source text.
    pub fn parse(source: &str) -> Result<Self> {
        if !source.contains("${") {
            return Ok(Expr::Literal(Value::String(source.to_string())));
        }

        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let body = &rest[start + 2..];
            let end = find_closing(body)
                .ok_or_else(|| ExprError::parse(source, "unterminated '${'"))?;
            segments.push(Segment::Reference(Reference::parse(source, &body[..end])?));
            rest = &body[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        if let [Segment::Reference(reference)] = segments.as_mut_slice() {
            return Ok(Expr::Reference(std::mem::take(reference)));
        }
        Ok(Expr::Template(segments))
    }

    /// Interpret a JSON document value: strings are parsed, everything else is literal.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Self::parse(&s),
            other => Ok(Expr::Literal(other)),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }
}

impl Reference {
    fn parse(source: &str, body: &str) -> Result<Self> {
        let mut stages = split_outside_quotes(source, body, '|')?.into_iter();
        let head = stages.next().unwrap_or_default();
        let (namespace, key) = head
            .trim()
            .split_once(':')
            .ok_or_else(|| ExprError::parse(source, "reference must be 'namespace:key'"))?;
        let (namespace, key) = (namespace.trim(), key.trim());
        if namespace.is_empty() || key.is_empty() {
            return Err(ExprError::parse(source, "empty namespace or key"));
        }

        let mut pipes = Vec::new();
        for stage in stages {
            let mut parts = split_outside_quotes(source, stage.trim(), ':')?.into_iter();
            let name = parts.next().unwrap_or_default().trim().to_string();
            if name.is_empty() {
                return Err(ExprError::parse(source, "empty pipe name"));
            }
            let args = parts.map(|arg| unquote(arg.trim()).to_string()).collect();
            pipes.push(PipeCall { name, args });
        }

        Ok(Reference {
            namespace: namespace.to_string(),
            key: key.to_string(),
            pipes,
        })
    }
}

/// Byte offset of the `}` closing a reference body, skipping quoted text
fn find_closing(body: &str) -> Option<usize> {
    let mut quoted = false;
    for (idx, c) in body.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '}' if !quoted => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_outside_quotes(source: &str, text: &str, sep: char) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        if c == '\'' {
            quoted = !quoted;
            current.push(c);
        } else if c == sep && !quoted {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if quoted {
        return Err(ExprError::parse(source, "unterminated quote"));
    }
    parts.push(current);
    Ok(parts)
}

fn unquote(arg: &str) -> &str {
    if arg.len() >= 2 && arg.starts_with('\'') && arg.ends_with('\'') {
        &arg[1..arg.len() - 1]
    } else {
        arg
    }
}

fn needs_quotes(arg: &str) -> bool {
    arg.contains([':', '|', '}']) || arg.trim() != arg
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}:{}", self.namespace, self.key)?;
        for pipe in &self.pipes {
            write!(f, " | {}", pipe.name)?;
            for arg in &pipe.args {
                if needs_quotes(arg) {
                    write!(f, ":'{}'", arg)?;
                } else {
                    write!(f, ":{}", arg)?;
                }
            }
        }
        f.write_str("}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => f.write_str(s),
            Expr::Literal(other) => write!(f, "{}", other),
            Expr::Reference(reference) => write!(f, "{}", reference),
            Expr::Template(segments) => {
                for segment in segments {
                    match segment {
                        Segment::Text(text) => f.write_str(text)?,
                        Segment::Reference(reference) => write!(f, "{}", reference)?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Expr::Literal(value) => value.serialize(serializer),
            other => serializer.collect_str(other),
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Expr::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_is_literal() {
        assert_eq!(Expr::parse("acme").unwrap(), Expr::literal("acme"));
    }

    #[test]
    fn test_single_reference_with_pipes() {
        let expr = Expr::parse("${user:joined | date_math:-1d | date:'%Y-%m-%d %H:%M'}").unwrap();
        let expected = Expr::Reference(Reference {
            namespace: "user".into(),
            key: "joined".into(),
            pipes: vec![
                PipeCall {
                    name: "date_math".into(),
                    args: vec!["-1d".into()],
                },
                PipeCall {
                    name: "date".into(),
                    args: vec!["%Y-%m-%d %H:%M".into()],
                },
            ],
        });
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_template_mixes_text_and_references() {
        let expr = Expr::parse("tenant-${user:org}/${request:id}").unwrap();
        match expr {
            Expr::Template(segments) => {
                assert_eq!(segments.len(), 4);
                assert_eq!(segments[0], Segment::Text("tenant-".into()));
                assert!(matches!(&segments[1], Segment::Reference(r) if r.key == "org"));
            }
            other => panic!("Expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["${user:org", "${org}", "${:org}", "${user:org | }", "${user:x | eq:'a}"] {
            assert!(
                matches!(Expr::parse(bad), Err(ExprError::Parse { .. })),
                "expected parse error for {}",
                bad
            );
        }
    }

    #[test]
    fn test_display_round_trips_source() {
        let source = "${user:joined | date:'%H:%M' | default:never}";
        let expr = Expr::parse(source).unwrap();
        assert_eq!(expr.to_string(), source);
        assert_eq!(Expr::parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_deserialize_from_json() {
        let literal: Expr = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(literal, Expr::literal(42));

        let reference: Expr = serde_json::from_value(json!("${user:org}")).unwrap();
        assert!(matches!(reference, Expr::Reference(_)));

        let err = serde_json::from_value::<Expr>(json!("${user"));
        assert!(err.is_err());
    }

    #[test]
    fn test_serialize_keeps_literal_type() {
        assert_eq!(serde_json::to_value(Expr::literal(true)).unwrap(), json!(true));
        assert_eq!(
            serde_json::to_value(Expr::parse("${user:org}").unwrap()).unwrap(),
            json!("${user:org}")
        );
    }
}
