//! Glob to regex compilation
//!
//! `*` becomes `.*`, `?` becomes `.`, and only `. \ [ ] ( )` are escaped.
//! Other regex metacharacters (`+ ^ $ { } |`) pass through verbatim, so a
//! glob containing them changes meaning once handed to a regex engine.

use crate::query::{Query, QueryKind};
use regex::Regex;

/// Compile a glob into a regex fragment (unanchored).
pub fn to_pattern(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '\\' | '[' | ']' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Compile a glob into a regex anchored at both ends.
///
/// Fails only when the pass-through metacharacters produce an invalid regex.
pub fn compile(glob: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", to_pattern(glob)))
}

impl Query {
    /// Regex fragment for a `Wildcard` node; `None` for other variants.
    pub fn to_pattern(&self) -> Option<String> {
        match &self.kind {
            QueryKind::Wildcard { pattern, .. } => Some(to_pattern(pattern)),
            _ => None,
        }
    }
}
