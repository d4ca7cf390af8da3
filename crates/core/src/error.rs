// SPDX-License-Identifier: MIT

//! The stable error taxonomy shared by every crate in the workspace.
//!
//! Every `thiserror` error type at a crate boundary carries a `code()` method
//! returning one of these variants, so the Kernel can classify a step
//! failure into abort/continue/retry without matching on crate-local error
//! types.

use serde::{Deserialize, Serialize};

/// Stable error codes, grouped by the taxonomy in the platform's error
/// handling design: integrity, validation, authorization, policy,
/// execution, budget, and plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Integrity
    JournalHashMismatch,
    JournalIoError,
    JournalFull,
    // Validation
    InputValidationFailed,
    OutputValidationFailed,
    InvalidEvent,
    InvalidManifest,
    // Authorization
    PermissionDenied,
    DelegationOutOfBounds,
    SignatureInvalid,
    // Policy
    PolicyPathDenied,
    PolicyCommandDenied,
    PolicyEndpointDenied,
    Ssrf,
    SensitiveFileDenied,
    DryRunPolicyViolation,
    // Execution
    ToolNotFound,
    CircuitOpen,
    Timeout,
    ExecutionError,
    // Budget
    LimitExceeded,
    // Plan
    PlannerEmptyInitial,
    PlannerEmptyContinue,
    PlannerError,
}

impl ErrorCode {
    /// Session-fatal classes per spec: Journal errors, budget exhaustion,
    /// an empty plan on the first iteration, and any `abort`-policy step
    /// outcome terminate the whole session. Everything else is recoverable
    /// per the step's own failure policy.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCode::JournalHashMismatch
                | ErrorCode::JournalIoError
                | ErrorCode::JournalFull
                | ErrorCode::LimitExceeded
                | ErrorCode::PlannerEmptyInitial
        )
    }

    /// `PLANNER_EMPTY_CONTINUE` is not an error; it signals a completed plan.
    pub fn is_informational(&self) -> bool {
        matches!(self, ErrorCode::PlannerEmptyContinue)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "UNKNOWN".to_string());
        f.write_str(&s)
    }
}

/// Trait implemented by every crate-local error enum so the Kernel can
/// classify failures uniformly.
pub trait Classified {
    fn code(&self) -> ErrorCode;
}
