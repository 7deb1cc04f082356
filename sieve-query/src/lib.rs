//! Backend-neutral query trees for Sieve
//!
//! This crate provides the intermediate query representation shared by callers,
//! the policy authorizer, and backend translators:
//!
//! - [`Query`]: an immutable node (a [`QueryKind`] plus optional label)
//! - **Algebra**: [`Query::simplify`] (flatten, identity/absorbing elements,
//!   `Terms` collapse) and [`Query::negate`] (De Morgan)
//! - **Composition**: [`Query::and_of`] / [`Query::or_of`] drop `None` inputs
//!   and simplify before returning
//! - **Wildcards**: [`wildcard::to_pattern`] compiles `*`/`?` globs to regex fragments
//! - **Wire codec**: `op`-tagged JSON via serde, with [`Query::from_json`]
//!   validating range bounds at decode time
//!
//! Translating a tree into a concrete backend's query language is out of scope.
//!
//! # Example
//!
//! ```rust
//! use sieve_query::Query;
//!
//! let q = Query::and_of([
//!     Some(Query::term("status", "open")),
//!     None,
//!     Some(Query::and(vec![Query::match_all(), Query::term("tenant", "acme")])),
//! ]);
//! assert_eq!(
//!     q,
//!     Query::and(vec![Query::term("status", "open"), Query::term("tenant", "acme")])
//! );
//! ```

mod algebra;
mod codec;
mod error;
mod query;
pub mod wildcard;

pub use error::{QueryError, Result};
pub use query::{Envelope, GeoPoint, MatchOperator, Query, QueryKind, RangeBounds};
