//! Engine configuration
//!
//! Loaded from JSON or TOML. Every field is optional in the file; absent
//! fields take the defaults below. TOML input may either set the fields at
//! the top level or under a `[policy]` section.
//!
//! ```toml
//! [policy]
//! strict_references = false
//! max_inherit_depth = 8
//! ```

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_INHERIT_DEPTH: usize = 32;

/// Tuning knobs for [`crate::PolicyEngine`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unknown ids in `inherits`/`policies` are errors (otherwise skipped)
    pub strict_references: bool,
    /// Longest allowed inheritance chain
    pub max_inherit_depth: usize,
    /// Skip non-replace constraints already present as top-level conjuncts
    pub dedupe_constraints: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_references: true,
            max_inherit_depth: DEFAULT_MAX_INHERIT_DEPTH,
            dedupe_constraints: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict_references(mut self, strict: bool) -> Self {
        self.strict_references = strict;
        self
    }

    pub fn with_max_inherit_depth(mut self, depth: usize) -> Self {
        self.max_inherit_depth = depth;
        self
    }

    pub fn with_dedupe_constraints(mut self, dedupe: bool) -> Self {
        self.dedupe_constraints = dedupe;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PolicyError::config(e.to_string()))?;
        config.validated()
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut table: toml::Table =
            toml::from_str(text).map_err(|e| PolicyError::config(e.to_string()))?;
        let section = match table.remove("policy") {
            Some(toml::Value::Table(section)) => section,
            Some(_) => return Err(PolicyError::config("[policy] must be a table")),
            None => table,
        };
        let config: Self = toml::Value::Table(section)
            .try_into()
            .map_err(|e: toml::de::Error| PolicyError::config(e.to_string()))?;
        config.validated()
    }

    fn validated(self) -> Result<Self> {
        if self.max_inherit_depth == 0 {
            return Err(PolicyError::config("max_inherit_depth must be at least 1"));
        }
        Ok(self)
    }
}
