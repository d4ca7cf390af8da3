// SPDX-License-Identifier: MIT

//! Delegation token shape shared between the permission engine (which
//! issues and verifies tokens) and the kernel (which applies them as a
//! child session's grants).

use crate::id::{DelegationId, SessionId};
use crate::scope::Scope;
use serde::{Deserialize, Serialize};

/// Which signature scheme backs a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    HmacSha256,
    Ed25519,
}

/// A signed capability envelope binding a child session's maximum authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationToken {
    pub id: DelegationId,
    pub child_session_id: SessionId,
    pub parent_session_id: SessionId,
    pub allowed_scopes: Vec<Scope>,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub algorithm: SignatureAlgorithm,
    /// Hex-encoded MAC / signature over the canonical signed fields.
    pub signature: String,
}

impl DelegationToken {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// The fields that are signed, in a fixed order, independent of
    /// `signature` itself. This is the ONLY representation ever hashed or
    /// signed — never the parsed struct, whose field order is not part of
    /// the wire contract.
    pub fn signed_fields(&self) -> SignedFields<'_> {
        SignedFields {
            id: &self.id,
            child_session_id: &self.child_session_id,
            parent_session_id: &self.parent_session_id,
            allowed_scopes: &self.allowed_scopes,
            issued_at_ms: self.issued_at_ms,
            expires_at_ms: self.expires_at_ms,
            algorithm: self.algorithm,
        }
    }
}

/// Canonical, fixed-field-order view of a token's signed content.
#[derive(Serialize)]
pub struct SignedFields<'a> {
    pub id: &'a DelegationId,
    pub child_session_id: &'a SessionId,
    pub parent_session_id: &'a SessionId,
    pub allowed_scopes: &'a [Scope],
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub algorithm: SignatureAlgorithm,
}

impl SignedFields<'_> {
    /// Canonical bytes to hash/sign: a fixed-field-order JSON encoding.
    /// `serde_json`'s struct serialization preserves declaration order, so
    /// this is stable across processes as long as the field list above
    /// doesn't change.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Derives the scopes a child token may carry from a parent's currently-held
/// grant scopes and an optional tool allowlist, per the delegation subset
/// invariant: `allowed_scopes = { s in parent : allowlist empty or s.resource in allowlist }`.
pub fn derive_allowed_scopes(parent_scopes: &[Scope], tool_allowlist: &[String]) -> Vec<Scope> {
    parent_scopes
        .iter()
        .filter(|s| tool_allowlist.is_empty() || tool_allowlist.iter().any(|a| a == s.resource()))
        .cloned()
        .collect()
}
