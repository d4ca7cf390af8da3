// SPDX-License-Identifier: MIT

//! Permission grants: an active decision bound to a session and scope.

use crate::id::GrantId;
use crate::scope::Scope;
use serde::{Deserialize, Serialize};

/// Who produced a grant decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granter {
    User,
    Policy,
    Delegation,
}

/// The decision an approval callback (or a pre-grant) returns for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantDecision {
    AllowOnce,
    AllowSession,
    AllowAlways,
    Deny,
}

impl GrantDecision {
    pub fn is_deny(&self) -> bool {
        matches!(self, GrantDecision::Deny)
    }
}

/// Lifetime of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum GrantTtl {
    /// Consumed by the first subsequent use of the exact scope.
    SingleUse,
    /// Survives until the session's grants are cleared.
    SessionBounded,
    /// Persists until an absolute wall-clock expiry.
    Absolute { expires_at_ms: u64 },
}

/// A recorded permission decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub scope: Scope,
    pub decision: GrantDecision,
    pub granter: Granter,
    pub granted_at_ms: u64,
    pub ttl: GrantTtl,
    /// Set once a `single_use` grant has been consumed.
    #[serde(default)]
    pub consumed: bool,
}

impl Grant {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.ttl {
            GrantTtl::Absolute { expires_at_ms } => now_ms >= expires_at_ms,
            GrantTtl::SingleUse => self.consumed,
            GrantTtl::SessionBounded => false,
        }
    }

    /// True if this grant, if active, satisfies `required`.
    pub fn satisfies(&self, required: &Scope, now_ms: u64) -> bool {
        !self.decision.is_deny() && !self.is_expired(now_ms) && self.scope.matches(required)
    }
}
