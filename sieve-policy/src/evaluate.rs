//! Policy evaluation
//!
//! Decides one request against a set of active roles:
//!
//! 1. Expand every active role into its resolved statements
//! 2. Keep the statements whose action pattern, resource pattern and
//!    condition all match
//! 3. Order matches by descending role priority, then by role declaration
//!    order in the source
//! 4. Deny-overrides: any matching `Deny` wins and yields no rewrites;
//!    otherwise any matching `Allow` allows; otherwise the request is
//!    implicitly denied
//!
//! A statement whose condition fails to evaluate is treated as not matching.
//! A rewrite whose condition fails to evaluate aborts the evaluation, since
//! silently dropping a scope constraint would widen the grant.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::resolve::{ResolvedStatement, RoleResolver};
use crate::source::PolicySource;
use crate::types::{Effect, Rewrite, Role, Statement};
use regex::Regex;
use sieve_expr::{Context, Evaluator};
use sieve_query::wildcard;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Outcome of combining the matched statements' effects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// At least one `Allow` matched and no `Deny` did
    Allow,
    /// A `Deny` statement matched; `statement` names the first one
    Deny { statement: String },
    /// Nothing matched
    Implicit,
}

/// Result of evaluating one request
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    /// Scope rewrites of the matching allow statements, in application order.
    /// Always empty unless `decision` is `Allow`.
    pub rewrites: Vec<Rewrite>,
    /// Names of every matching statement, in priority order
    pub matched: Vec<String>,
    /// Ids of the roles the evaluation ran with
    pub active_roles: Vec<String>,
}

impl Evaluation {
    /// Implicit deny with no matches
    pub fn implicit(active_roles: Vec<String>) -> Self {
        Self {
            decision: Decision::Implicit,
            rewrites: Vec::new(),
            matched: Vec::new(),
            active_roles,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Evaluates requests against roles from a [`PolicySource`]
#[derive(Debug, Clone, Copy)]
pub struct PolicyEvaluator<'a> {
    evaluator: &'a Evaluator,
    config: &'a EngineConfig,
}

/// A matching statement tagged with its ordering keys
struct Match<'s> {
    priority: i32,
    /// Index of the active role in `PolicySource::roles()`
    position: usize,
    resolved: ResolvedStatement<'s>,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(evaluator: &'a Evaluator, config: &'a EngineConfig) -> Self {
        Self { evaluator, config }
    }

    /// Keep the candidate roles whose activation condition holds.
    ///
    /// Unknown ids and conditions that fail to evaluate leave the role
    /// inactive. Duplicate candidates are activated once.
    pub fn activate<'s, S, I>(&self, source: &'s S, candidates: I, ctx: &Context) -> Vec<&'s Role>
    where
        S: PolicySource + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut active = Vec::new();
        for candidate in candidates {
            let id = candidate.as_ref();
            let Some(role) = source.role(id) else {
                warn!(role = %id, "Unknown candidate role");
                continue;
            };
            if !seen.insert(role.id.as_str()) {
                continue;
            }
            match self.evaluator.check(&role.condition, ctx) {
                Ok(true) => active.push(role),
                Ok(false) => trace!(role = %id, "Role condition false"),
                Err(e) => warn!(role = %id, error = %e, "Role condition failed; role inactive"),
            }
        }
        active
    }

    /// Decide `action` on `resource` for the given active roles
    pub fn evaluate<S>(
        &self,
        source: &S,
        active: &[&Role],
        action: &str,
        resource: &str,
        ctx: &Context,
    ) -> Result<Evaluation>
    where
        S: PolicySource + ?Sized,
    {
        let active_roles: Vec<String> = active.iter().map(|r| r.id.clone()).collect();
        if active.is_empty() {
            debug!(action, resource, "No active role; implicit deny");
            return Ok(Evaluation::implicit(active_roles));
        }

        let resolver = RoleResolver::new(source, self.config);
        let mut patterns = PatternCache::default();
        let mut matches = Vec::new();

        // declaration order in the source, never the caller's candidate order
        let mut ordered: Vec<(usize, &Role)> = active
            .iter()
            .map(|role| (declaration_index(source, role), *role))
            .collect();
        ordered.sort_by_key(|(position, _)| *position);

        for (position, role) in ordered {
            for resolved in resolver.expand(role)? {
                if self.statement_matches(resolved.statement, action, resource, ctx, &mut patterns) {
                    trace!(role = %role.id, statement = %resolved.name, "Statement matched");
                    matches.push(Match {
                        priority: role.priority,
                        position,
                        resolved,
                    });
                }
            }
        }

        // stable: statements of one role keep resolution order
        matches.sort_by_key(|m| (Reverse(m.priority), m.position));
        let matched: Vec<String> = matches.iter().map(|m| m.resolved.name.clone()).collect();

        if let Some(deny) = matches
            .iter()
            .find(|m| m.resolved.statement.effect == Effect::Deny)
        {
            let statement = deny.resolved.name.clone();
            debug!(action, resource, statement = %statement, "Explicit deny");
            return Ok(Evaluation {
                decision: Decision::Deny { statement },
                rewrites: Vec::new(),
                matched,
                active_roles,
            });
        }

        if matches.is_empty() {
            debug!(action, resource, "No statement matched; implicit deny");
            return Ok(Evaluation::implicit(active_roles));
        }

        let mut rewrites = Vec::new();
        for m in &matches {
            for rewrite in &m.resolved.statement.scope {
                if self.evaluator.check(&rewrite.condition, ctx)? {
                    rewrites.push(rewrite.clone());
                }
            }
        }

        debug!(
            action,
            resource,
            matched = matched.len(),
            rewrites = rewrites.len(),
            "Allow"
        );
        Ok(Evaluation {
            decision: Decision::Allow,
            rewrites,
            matched,
            active_roles,
        })
    }

    fn statement_matches(
        &self,
        statement: &Statement,
        action: &str,
        resource: &str,
        ctx: &Context,
        patterns: &mut PatternCache,
    ) -> bool {
        if !patterns.any_matches(&statement.actions, action)
            || !patterns.any_matches(&statement.resource, resource)
        {
            return false;
        }
        match self.evaluator.check(&statement.condition, ctx) {
            Ok(holds) => holds,
            Err(e) => {
                warn!(
                    statement = ?statement.id,
                    error = %e,
                    "Statement condition failed; treating as non-matching"
                );
                false
            }
        }
    }
}

fn declaration_index<S: PolicySource + ?Sized>(source: &S, role: &Role) -> usize {
    source
        .roles()
        .iter()
        .position(|r| r.id == role.id)
        .unwrap_or(usize::MAX)
}

/// Compiled glob patterns for one evaluation.
///
/// A pattern that does not compile is cached as `None` and never matches.
#[derive(Default)]
struct PatternCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl PatternCache {
    /// True if `candidate` matches any pattern; an empty list matches nothing
    fn any_matches(&mut self, globs: &[String], candidate: &str) -> bool {
        globs.iter().any(|glob| self.matches(glob, candidate))
    }

    fn matches(&mut self, glob: &str, candidate: &str) -> bool {
        if !self.compiled.contains_key(glob) {
            let compiled = match wildcard::compile(glob) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %glob, error = %e, "Invalid pattern never matches");
                    None
                }
            };
            self.compiled.insert(glob.to_string(), compiled);
        }
        matches!(self.compiled.get(glob), Some(Some(re)) if re.is_match(candidate))
    }
}
