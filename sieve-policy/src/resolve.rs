//! Role expansion
//!
//! Expands one active role into its full statement list:
//! own statements, then the statements of each policy in `policies` order,
//! then inherited roles depth-first in `inherits` order.
//!
//! A role reached a second time through a different branch (diamond) is
//! expanded once. A role reached again while it is still on the expansion
//! path is a cycle and fails the evaluation.

use crate::config::EngineConfig;
use crate::error::{PolicyError, Result};
use crate::source::PolicySource;
use crate::types::{Role, Statement};
use std::collections::HashSet;
use tracing::warn;

/// A statement reached while expanding an active role
#[derive(Debug, Clone)]
pub(crate) struct ResolvedStatement<'s> {
    pub statement: &'s Statement,
    /// Statement id, or `owner#index` for anonymous statements
    pub name: String,
}

impl<'s> ResolvedStatement<'s> {
    fn new(statement: &'s Statement, owner: &str, index: usize) -> Self {
        let name = match &statement.id {
            Some(id) => id.clone(),
            None => format!("{owner}#{index}"),
        };
        Self { statement, name }
    }
}

pub(crate) struct RoleResolver<'s, S: PolicySource + ?Sized> {
    source: &'s S,
    config: &'s EngineConfig,
}

/// Expansion state for one active role
#[derive(Default)]
struct Walk<'s> {
    path: Vec<&'s str>,
    visited_roles: HashSet<&'s str>,
    visited_policies: HashSet<&'s str>,
    out: Vec<ResolvedStatement<'s>>,
}

impl<'s, S: PolicySource + ?Sized> RoleResolver<'s, S> {
    pub fn new(source: &'s S, config: &'s EngineConfig) -> Self {
        Self { source, config }
    }

    /// Full statement list for `role`, in resolution order
    pub fn expand(&self, role: &'s Role) -> Result<Vec<ResolvedStatement<'s>>> {
        let mut walk = Walk::default();
        self.visit(role, &mut walk)?;
        Ok(walk.out)
    }

    fn visit(&self, role: &'s Role, walk: &mut Walk<'s>) -> Result<()> {
        if walk.path.contains(&role.id.as_str()) {
            let mut cycle: Vec<&str> = walk.path.clone();
            cycle.push(&role.id);
            return Err(PolicyError::InheritanceCycle {
                path: cycle.join(" -> "),
            });
        }
        if !walk.visited_roles.insert(&role.id) {
            return Ok(());
        }
        // path holds the ancestors; its length is this role's depth
        if walk.path.len() > self.config.max_inherit_depth {
            return Err(PolicyError::InheritanceDepth {
                role: role.id.clone(),
                max: self.config.max_inherit_depth,
            });
        }

        walk.out.extend(
            role.statements
                .iter()
                .enumerate()
                .map(|(idx, stmt)| ResolvedStatement::new(stmt, &role.id, idx)),
        );

        for policy_id in &role.policies {
            let Some(policy) = self.source.policy(policy_id) else {
                if self.config.strict_references {
                    return Err(PolicyError::unknown_policy(policy_id, &role.id));
                }
                warn!(role = %role.id, policy = %policy_id, "Skipping unknown policy");
                continue;
            };
            if !walk.visited_policies.insert(&policy.id) {
                continue;
            }
            walk.out.extend(
                policy
                    .statements
                    .iter()
                    .enumerate()
                    .map(|(idx, stmt)| ResolvedStatement::new(stmt, &policy.id, idx)),
            );
        }

        walk.path.push(&role.id);
        for parent_id in &role.inherits {
            match self.source.role(parent_id) {
                Some(parent) => self.visit(parent, walk)?,
                None if self.config.strict_references => {
                    return Err(PolicyError::unknown_role(parent_id, &role.id));
                }
                None => {
                    warn!(role = %role.id, inherits = %parent_id, "Skipping unknown role");
                }
            }
        }
        walk.path.pop();

        Ok(())
    }
}
