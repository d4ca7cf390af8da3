// SPDX-License-Identifier: MIT

use ak_core::{Classified, ErrorCode, LimitDimension};
use thiserror::Error;

/// Errors the Kernel's own loop can raise, distinct from a step's tool
/// failure (which is classified and folded into the step's failure policy
/// rather than ever reaching here).
///
/// `Journal` is the one variant that means the loop can no longer record
/// what's happening to it at all: every other error still gets a
/// `session.failed` event written before `run` returns it, but a broken
/// journal can't be trusted to take that write either, so `run` bails out
/// immediately instead of trying.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("journal write failed: {0}")]
    Journal(#[from] ak_journal::JournalError),

    #[error("permission engine error: {0}")]
    Permission(#[from] ak_permissions::PermissionError),
}

impl Classified for KernelError {
    fn code(&self) -> ErrorCode {
        match self {
            KernelError::Journal(e) => e.code(),
            KernelError::Permission(e) => e.code(),
        }
    }
}

/// Why a session reached a terminal, non-completed status. Distinct from
/// [`KernelError`]: every variant here is something the loop successfully
/// journaled as `session.failed`/`session.aborted` before returning `Ok`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFailure {
    LimitExceeded(LimitDimension),
    PlannerEmptyInitial,
    PlannerError(String),
    StepAborted { step_id: String, code: ErrorCode, reason: String },
    Aborted(String),
}

impl SessionFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionFailure::LimitExceeded(_) => ErrorCode::LimitExceeded,
            SessionFailure::PlannerEmptyInitial => ErrorCode::PlannerEmptyInitial,
            SessionFailure::PlannerError(_) => ErrorCode::PlannerError,
            SessionFailure::StepAborted { code, .. } => *code,
            SessionFailure::Aborted(_) => ErrorCode::ExecutionError,
        }
    }
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionFailure::LimitExceeded(dim) => write!(f, "limit exceeded: {dim}"),
            SessionFailure::PlannerEmptyInitial => write!(f, "planner returned an empty plan on the first iteration"),
            SessionFailure::PlannerError(reason) => write!(f, "planner error: {reason}"),
            SessionFailure::StepAborted { step_id, reason, .. } => write!(f, "step {step_id} aborted: {reason}"),
            SessionFailure::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}
