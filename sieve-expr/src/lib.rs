//! Expression evaluation for Sieve policies
//!
//! Policy conditions and rewrite values are small expressions evaluated
//! against a run-time [`Context`]:
//!
//! - **Literals**: any JSON value, or a string without `${`
//! - **References**: `${namespace:key | pipe:arg | ...}` resolve a namespaced
//!   key and feed it through a pipeline of [`Pipe`]s
//! - **Templates**: text with embedded references, producing a string
//!
//! A [`Condition`] is an expression read for its truth value. Policy records
//! default theirs with [`Condition::always`] or [`Condition::never`].
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sieve_expr::{Condition, Context, Evaluator, Expr};
//!
//! let eval = Evaluator::new();
//! let ctx = Context::new().with("user", json!({"org": "acme", "groups": ["eng"]}));
//!
//! let value = Expr::parse("${user:org | upper}").unwrap();
//! assert_eq!(eval.evaluate(&value, &ctx).unwrap(), json!("ACME"));
//!
//! let cond = Condition::parse("${user:groups | contains:eng}").unwrap();
//! assert!(eval.check(&cond, &ctx).unwrap());
//! ```

mod condition;
mod context;
mod error;
mod eval;
mod expr;
mod pipes;

pub use condition::Condition;
pub use context::Context;
pub use error::{ExprError, Result};
pub use eval::{
    Clock, ContextResolver, Evaluator, FixedClock, KeyResolver, Pipe, SystemClock,
    CLOCK_NAMESPACE,
};
pub use expr::{Expr, PipeCall, Reference, Segment};
