//! Policy sources
//!
//! A [`PolicySource`] hands the evaluator an immutable snapshot of every
//! policy and role. [`StaticPolicySource`] is the in-memory implementation
//! loaded from a JSON document:
//!
//! ```json
//! { "policies": [ { "id": "...", "statements": [...] } ],
//!   "roles":    [ { "id": "...", "inherits": [...], "statements": [...] } ] }
//! ```

use crate::error::{PolicyError, Result};
use crate::types::{Policy, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supplies policy and role records for one evaluation
pub trait PolicySource: Send + Sync {
    /// Every policy, in declaration order
    fn policies(&self) -> &[Policy];

    /// Every role, in declaration order
    fn roles(&self) -> &[Role];

    fn policy(&self, id: &str) -> Option<&Policy> {
        self.policies().iter().find(|p| p.id == id)
    }

    fn role(&self, id: &str) -> Option<&Role> {
        self.roles().iter().find(|r| r.id == id)
    }
}

/// Serialized policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// In-memory policy snapshot with id lookup
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    policies: Vec<Policy>,
    roles: Vec<Role>,
    policy_index: HashMap<String, usize>,
    role_index: HashMap<String, usize>,
}

impl StaticPolicySource {
    /// Build a source, rejecting duplicate role or policy ids
    pub fn new(policies: Vec<Policy>, roles: Vec<Role>) -> Result<Self> {
        let mut policy_index = HashMap::with_capacity(policies.len());
        for (idx, policy) in policies.iter().enumerate() {
            if policy_index.insert(policy.id.clone(), idx).is_some() {
                return Err(PolicyError::duplicate_id("policy", &policy.id));
            }
        }

        let mut role_index = HashMap::with_capacity(roles.len());
        for (idx, role) in roles.iter().enumerate() {
            if role_index.insert(role.id.clone(), idx).is_some() {
                return Err(PolicyError::duplicate_id("role", &role.id));
            }
        }

        Ok(Self {
            policies,
            roles,
            policy_index,
            role_index,
        })
    }

    pub fn from_document(doc: PolicyDocument) -> Result<Self> {
        Self::new(doc.policies, doc.roles)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: PolicyDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let doc: PolicyDocument = serde_json::from_value(value)?;
        Self::from_document(doc)
    }

    pub fn to_document(&self) -> PolicyDocument {
        PolicyDocument {
            policies: self.policies.clone(),
            roles: self.roles.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.roles.is_empty()
    }
}

impl PolicySource for StaticPolicySource {
    fn policies(&self) -> &[Policy] {
        &self.policies
    }

    fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn policy(&self, id: &str) -> Option<&Policy> {
        self.policy_index.get(id).map(|&idx| &self.policies[idx])
    }

    fn role(&self, id: &str) -> Option<&Role> {
        self.role_index.get(id).map(|&idx| &self.roles[idx])
    }
}
