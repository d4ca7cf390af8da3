// SPDX-License-Identifier: MIT

//! The permission engine: gates tool calls by scope, mediates interactive
//! approval, records grants, and enforces delegation boundaries.

use crate::error::PermissionError;
use crate::signing::SigningKeys;
use ak_core::{
    derive_allowed_scopes, Clock, DelegationId, DelegationToken, Grant, GrantDecision, GrantId, GrantTtl, Granter,
    Scope, SessionId, StepId, SystemClock,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Context passed to the approval callback for a single required scope.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub session_id: SessionId,
    pub step_id: Option<StepId>,
    pub tool: String,
    pub scopes: Vec<Scope>,
}

/// Outcome of [`PermissionEngine::check`].
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub allowed: bool,
    pub grants: Vec<Grant>,
    pub denials: Vec<Scope>,
}

/// Mediates interactive approval for a scope this session doesn't already
/// hold a grant for.
#[async_trait]
pub trait ApprovalCallback {
    async fn decide(&self, request: &CheckRequest, scope: &Scope) -> GrantDecision;
}

/// A delegation capability token enforcer: asked before the approval
/// callback, a `false` vote short-circuits to deny regardless of grants.
pub trait DctEnforcer: Send + Sync {
    fn validate_scope(&self, scope: &Scope) -> bool;
}

/// Emitted by the engine for every grant/denial decision it records, so the
/// caller can journal it without this crate depending on `ak-journal`
/// directly (keeping the dependency direction pointing one way: journal
/// consumers, not journal producers of policy).
#[derive(Debug, Clone)]
pub enum AuditEvent {
    Granted { session_id: SessionId, scope: Scope, decision: GrantDecision, granter: Granter },
    Denied { session_id: SessionId, scope: Scope, granter: Granter },
    Revoked { session_id: SessionId, scope: Scope },
}

#[derive(Default)]
struct SessionGrants {
    grants: Vec<Grant>,
}

pub struct PermissionEngine {
    approval: Box<dyn ApprovalCallback + Send + Sync>,
    clock: Box<dyn Clock>,
    sessions: Mutex<HashMap<SessionId, SessionGrants>>,
    /// Process-wide `allow_always` registry, namespaced by tool name so a
    /// grant issued in the context of one tool never silently applies to an
    /// unrelated tool whose manifest happens to declare the same scope
    /// string.
    allow_always: Mutex<HashMap<(String, Scope), Grant>>,
    dct_enforcer: Mutex<Option<Box<dyn DctEnforcer>>>,
    audit_sink: Mutex<Vec<AuditEvent>>,
}

impl PermissionEngine {
    pub fn new(approval: Box<dyn ApprovalCallback + Send + Sync>) -> Self {
        Self::with_clock(approval, Box::new(SystemClock))
    }

    pub fn with_clock(approval: Box<dyn ApprovalCallback + Send + Sync>, clock: Box<dyn Clock>) -> Self {
        Self {
            approval,
            clock,
            sessions: Mutex::new(HashMap::new()),
            allow_always: Mutex::new(HashMap::new()),
            dct_enforcer: Mutex::new(None),
            audit_sink: Mutex::new(Vec::new()),
        }
    }

    pub fn set_dct_enforcer(&self, enforcer: Box<dyn DctEnforcer>) {
        *self.dct_enforcer.lock() = Some(enforcer);
    }

    /// Drains the audit events recorded since the last drain. Callers
    /// (typically the Kernel) forward these into the Journal.
    pub fn drain_audit_events(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut self.audit_sink.lock())
    }

    fn active_grant_for(&self, tool: &str, session_id: SessionId, scope: &Scope, now_ms: u64) -> Option<Grant> {
        if let Some(grant) = self.allow_always.lock().get(&(tool.to_string(), scope.clone())) {
            if grant.satisfies(scope, now_ms) {
                return Some(grant.clone());
            }
        }
        let sessions = self.sessions.lock();
        sessions
            .get(&session_id)
            .and_then(|s| s.grants.iter().find(|g| !g.consumed && g.satisfies(scope, now_ms)))
            .cloned()
    }

    fn record_grant(&self, tool: &str, session_id: SessionId, grant: Grant) {
        if matches!(grant.ttl, GrantTtl::SessionBounded) && matches!(grant.decision, GrantDecision::AllowAlways) {
            self.allow_always.lock().insert((tool.to_string(), grant.scope.clone()), grant);
            return;
        }
        let mut sessions = self.sessions.lock();
        sessions.entry(session_id).or_default().grants.push(grant);
    }

    fn consume_single_use(&self, session_id: SessionId, scope: &Scope) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&session_id) {
            for grant in session.grants.iter_mut() {
                if grant.scope == *scope && matches!(grant.ttl, GrantTtl::SingleUse) {
                    grant.consumed = true;
                    break;
                }
            }
        }
    }

    /// Gates a tool call by a permission scope check. For every required
    /// scope: reuse an existing active grant if one satisfies it, else ask
    /// the DCT enforcer (if any) then the approval callback, and record the
    /// resulting decision.
    pub async fn check(&self, request: CheckRequest) -> CheckOutcome {
        let now = self.clock.epoch_ms();
        let mut grants = Vec::new();
        let mut denials = Vec::new();

        for scope in &request.scopes {
            if let Some(existing) = self.active_grant_for(&request.tool, request.session_id, scope, now) {
                if matches!(existing.ttl, GrantTtl::SingleUse) {
                    self.consume_single_use(request.session_id, scope);
                }
                grants.push(existing);
                continue;
            }

            let dct_allows = self.dct_enforcer.lock().as_ref().map(|e| e.validate_scope(scope)).unwrap_or(true);
            if !dct_allows {
                denials.push(scope.clone());
                self.audit_sink.lock().push(AuditEvent::Denied {
                    session_id: request.session_id,
                    scope: scope.clone(),
                    granter: Granter::Delegation,
                });
                continue;
            }

            let decision = self.approval.decide(&request, scope).await;
            if decision.is_deny() {
                denials.push(scope.clone());
                self.audit_sink.lock().push(AuditEvent::Denied {
                    session_id: request.session_id,
                    scope: scope.clone(),
                    granter: Granter::User,
                });
                continue;
            }

            let ttl = match decision {
                GrantDecision::AllowOnce => GrantTtl::SingleUse,
                GrantDecision::AllowSession | GrantDecision::AllowAlways => GrantTtl::SessionBounded,
                GrantDecision::Deny => unreachable!("deny handled above"),
            };
            let grant = Grant {
                id: GrantId::new(),
                scope: scope.clone(),
                decision,
                granter: Granter::User,
                granted_at_ms: now,
                ttl,
                consumed: false,
            };
            self.audit_sink.lock().push(AuditEvent::Granted {
                session_id: request.session_id,
                scope: scope.clone(),
                decision,
                granter: Granter::User,
            });
            self.record_grant(&request.tool, request.session_id, grant.clone());
            grants.push(grant);
        }

        CheckOutcome { allowed: denials.is_empty(), grants, denials }
    }

    /// Installs grants without invoking the approval callback. Used to
    /// materialize delegation-token scopes into a freshly created child
    /// session.
    pub fn pre_grant(&self, session_id: SessionId, scopes: &[Scope]) {
        let now = self.clock.epoch_ms();
        let mut sessions = self.sessions.lock();
        let entry = sessions.entry(session_id).or_default();
        for scope in scopes {
            entry.grants.push(Grant {
                id: GrantId::new(),
                scope: scope.clone(),
                decision: GrantDecision::AllowSession,
                granter: Granter::Delegation,
                granted_at_ms: now,
                ttl: GrantTtl::SessionBounded,
                consumed: false,
            });
        }
    }

    pub fn is_granted(&self, scope: &Scope, session_id: SessionId) -> bool {
        let now = self.clock.epoch_ms();
        let sessions = self.sessions.lock();
        sessions.get(&session_id).is_some_and(|s| s.grants.iter().any(|g| g.satisfies(scope, now)))
    }

    pub fn list_grants(&self, session_id: SessionId) -> Vec<Grant> {
        self.sessions.lock().get(&session_id).map(|s| s.grants.clone()).unwrap_or_default()
    }

    pub fn clear_session(&self, session_id: SessionId) {
        self.sessions.lock().remove(&session_id);
    }

    /// Derives and signs a delegation token for `child_session_id`, whose
    /// allowed scopes are the parent's currently-held grant scopes filtered
    /// by `tool_allowlist` (empty allowlist keeps everything).
    pub fn issue_delegation(
        &self,
        keys: &SigningKeys,
        parent_session_id: SessionId,
        child_session_id: SessionId,
        tool_allowlist: &[String],
        ttl_ms: u64,
    ) -> Result<DelegationToken, PermissionError> {
        let now = self.clock.epoch_ms();
        let parent_scopes: Vec<Scope> =
            self.list_grants(parent_session_id).into_iter().filter(|g| !g.is_expired(now)).map(|g| g.scope).collect();
        let allowed_scopes = derive_allowed_scopes(&parent_scopes, tool_allowlist);

        let mut token = DelegationToken {
            id: DelegationId::new(),
            child_session_id,
            parent_session_id,
            allowed_scopes,
            issued_at_ms: now,
            expires_at_ms: now + ttl_ms,
            algorithm: keys.algorithm(),
            signature: String::new(),
        };
        token.signature = keys.sign(&token)?;
        Ok(token)
    }

    /// Verifies a delegation token's signature and, if valid, applies its
    /// allowed scopes as pre-grants on the child session. Returns an error
    /// if the signature doesn't verify or the token has expired.
    pub fn apply_delegation(&self, keys: &SigningKeys, token: &DelegationToken) -> Result<(), PermissionError> {
        if !keys.verify(token)? {
            return Err(PermissionError::SignatureInvalid);
        }
        let now = self.clock.epoch_ms();
        if token.is_expired(now) {
            return Err(PermissionError::DelegationOutOfBounds);
        }
        self.pre_grant(token.child_session_id, &token.allowed_scopes);
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
