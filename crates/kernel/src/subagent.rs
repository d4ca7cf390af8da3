// SPDX-License-Identifier: MIT

//! Subagent delegation: spins up a child session under a scope-restricted
//! delegation token and runs it to completion, folding whatever happened
//! into a plain result rather than letting it propagate as an error.
//!
//! Kernel and its subagent form a cycle (a kernel can spawn a kernel); this
//! module breaks that cycle by taking a `&Kernel` handle and building the
//! child as a fresh value rather than Kernel holding a reference to itself.

use crate::abort::AbortHandle;
use crate::kernel::Kernel;
use crate::planner::{Finding, Planner};
use ak_core::{Aggregates, ExecutionMode, Limits, Session, SessionId, SessionStatus};
use ak_permissions::SigningKeys;
use ak_tools::Policy;

/// Everything needed to run one delegated subtask: its own planner, its own
/// (reduced) budget, and the scopes it's allowed to inherit from the
/// parent's current grants.
pub struct SubagentRequest {
    pub parent_session_id: SessionId,
    pub task: String,
    pub limits: Limits,
    pub policy_profile: String,
    pub policy: Policy,
    pub mode: ExecutionMode,
    pub agentic: bool,
    pub tool_allowlist: Vec<String>,
    pub planner: Box<dyn Planner>,
    pub signing_keys: SigningKeys,
    pub delegation_ttl_ms: u64,
}

/// What a subagent run hands back to whichever step spawned it.
#[derive(Debug, Clone)]
pub struct SubagentOutcome {
    pub status: SessionStatus,
    pub findings: Vec<Finding>,
    pub tokens_used: u64,
}

impl SubagentOutcome {
    fn denied() -> Self {
        Self { status: SessionStatus::Failed, findings: Vec::new(), tokens_used: 0 }
    }
}

pub(crate) async fn run_subagent(kernel: &Kernel, request: SubagentRequest) -> SubagentOutcome {
    let child_session_id = SessionId::new();

    let token = match kernel.permissions().issue_delegation(
        &request.signing_keys,
        request.parent_session_id,
        child_session_id,
        &request.tool_allowlist,
        request.delegation_ttl_ms,
    ) {
        Ok(token) => token,
        Err(error) => {
            tracing::warn!(%error, "failed to issue a delegation token for a subagent run");
            return SubagentOutcome::denied();
        }
    };

    if let Err(error) = kernel.permissions().apply_delegation(&request.signing_keys, &token) {
        tracing::warn!(%error, "failed to apply a subagent's delegation token");
        return SubagentOutcome::denied();
    }

    let child_kernel = Kernel::with_clock(
        kernel.journal_handle().clone(),
        kernel.permissions().clone(),
        kernel.tools().clone(),
        request.planner,
        kernel.clock().clone(),
    );

    let child_session = Session {
        id: child_session_id,
        task: request.task,
        created_at_ms: kernel.clock().epoch_ms(),
        status: SessionStatus::Created,
        aggregates: Aggregates::default(),
        limits: request.limits,
        policy_profile: request.policy_profile,
    };

    match child_kernel.run(child_session, request.mode, request.agentic, request.policy, AbortHandle::new()).await {
        Ok((session, findings)) => {
            SubagentOutcome { status: session.status, findings, tokens_used: session.aggregates.tokens_used }
        }
        Err(error) => {
            tracing::warn!(%error, "subagent session could not be journaled");
            SubagentOutcome::denied()
        }
    }
}
