//! Expression evaluation
//!
//! The [`Evaluator`] holds two narrow, injectable registries:
//! - [`KeyResolver`] per namespace: `(namespace, key, context) -> value`.
//!   Namespaces without a registered resolver read from the [`Context`].
//! - [`Pipe`] per name: `(value, args, context) -> value`.
//!
//! Nothing is global; tests build an evaluator with deterministic stand-ins
//! (see [`FixedClock`]).

use crate::condition::Condition;
use crate::context::Context;
use crate::error::{ExprError, Result};
use crate::expr::{Expr, Reference, Segment};
use crate::pipes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves `namespace:key` against a context
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, namespace: &str, key: &str, context: &Context) -> Result<Value>;
}

/// One pipeline stage
pub trait Pipe: Send + Sync {
    fn apply(&self, input: Value, args: &[String], context: &Context) -> Result<Value>;
}

impl<F> Pipe for F
where
    F: Fn(Value, &[String], &Context) -> Result<Value> + Send + Sync,
{
    fn apply(&self, input: Value, args: &[String], context: &Context) -> Result<Value> {
        self(input, args, context)
    }
}

/// Source of "now" for time-relative pipes and the `clock` namespace
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Default resolver: `context[namespace]` walked by the dotted key; missing is `null`
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextResolver;

impl KeyResolver for ContextResolver {
    fn resolve(&self, namespace: &str, key: &str, context: &Context) -> Result<Value> {
        Ok(context.lookup(namespace, key).cloned().unwrap_or(Value::Null))
    }
}

/// The `clock` namespace: `${clock:now}` yields the current instant as RFC 3339
struct ClockResolver(Arc<dyn Clock>);

impl KeyResolver for ClockResolver {
    fn resolve(&self, namespace: &str, key: &str, _context: &Context) -> Result<Value> {
        match key {
            "now" => Ok(Value::String(
                self.0.now().to_rfc3339_opts(SecondsFormat::Secs, true),
            )),
            "epoch_millis" => Ok(Value::from(self.0.now().timestamp_millis())),
            _ => Err(ExprError::resolve(namespace, key, "unknown clock key")),
        }
    }
}

/// Namespace served by the built-in clock resolver
pub const CLOCK_NAMESPACE: &str = "clock";

/// Evaluates expressions and conditions against a [`Context`]
#[derive(Clone)]
pub struct Evaluator {
    resolvers: HashMap<String, Arc<dyn KeyResolver>>,
    fallback: Arc<dyn KeyResolver>,
    pipes: HashMap<String, Arc<dyn Pipe>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut namespaces: Vec<_> = self.resolvers.keys().collect();
        namespaces.sort();
        let mut pipes: Vec<_> = self.pipes.keys().collect();
        pipes.sort();
        f.debug_struct("Evaluator")
            .field("namespaces", &namespaces)
            .field("pipes", &pipes)
            .finish()
    }
}

impl Evaluator {
    /// Evaluator with the built-in pipes and the system clock
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            fallback: Arc::new(ContextResolver),
            pipes: HashMap::new(),
        }
        .with_builtin_pipes()
        .with_clock(SystemClock)
    }

    /// Evaluator with no pipes and no clock namespace
    pub fn bare() -> Self {
        Self {
            resolvers: HashMap::new(),
            fallback: Arc::new(ContextResolver),
            pipes: HashMap::new(),
        }
    }

    fn with_builtin_pipes(mut self) -> Self {
        for (name, pipe) in pipes::builtin() {
            self.pipes.insert(name.to_string(), pipe);
        }
        self
    }

    /// Register a resolver for one namespace
    pub fn with_resolver(
        mut self,
        namespace: impl Into<String>,
        resolver: impl KeyResolver + 'static,
    ) -> Self {
        self.resolvers.insert(namespace.into(), Arc::new(resolver));
        self
    }

    /// Replace the resolver used for namespaces without a registered resolver
    pub fn with_fallback_resolver(mut self, resolver: impl KeyResolver + 'static) -> Self {
        self.fallback = Arc::new(resolver);
        self
    }

    /// Register or replace a pipe
    pub fn with_pipe(mut self, name: impl Into<String>, pipe: impl Pipe + 'static) -> Self {
        self.pipes.insert(name.into(), Arc::new(pipe));
        self
    }

    /// Use `clock` for `${clock:...}` and the `since` pipe
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        self.resolvers.insert(
            CLOCK_NAMESPACE.to_string(),
            Arc::new(ClockResolver(Arc::clone(&clock))),
        );
        self.pipes
            .insert("since".to_string(), Arc::new(pipes::since(clock)));
        self
    }

    /// Parse source text into a reusable expression
    pub fn compile(&self, source: &str) -> Result<Expr> {
        Expr::parse(source)
    }

    /// Evaluate an expression to a value
    pub fn evaluate(&self, expr: &Expr, context: &Context) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Reference(reference) => self.evaluate_reference(reference, context),
            Expr::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Reference(reference) => {
                            match self.evaluate_reference(reference, context)? {
                                Value::Null => {}
                                Value::String(s) => out.push_str(&s),
                                other => out.push_str(&other.to_string()),
                            }
                        }
                    }
                }
                Ok(Value::String(out))
            }
        }
    }

    /// Evaluate a condition: `true`/`false` as given, `null` is false.
    pub fn check(&self, condition: &Condition, context: &Context) -> Result<bool> {
        match self.evaluate(condition.expr(), context)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(ExprError::NotBoolean {
                value: other.to_string(),
            }),
        }
    }

    fn evaluate_reference(&self, reference: &Reference, context: &Context) -> Result<Value> {
        let resolver = self
            .resolvers
            .get(&reference.namespace)
            .unwrap_or(&self.fallback);
        let mut value = resolver.resolve(&reference.namespace, &reference.key, context)?;
        for call in &reference.pipes {
            let pipe = self
                .pipes
                .get(&call.name)
                .ok_or_else(|| ExprError::unknown_pipe(&call.name))?;
            value = pipe.apply(value, &call.args, context)?;
        }
        tracing::trace!(expr = %reference, value = %value, "evaluated reference");
        Ok(value)
    }
}
