// SPDX-License-Identifier: MIT

use ak_core::{Classified, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no tool manifest registered under {0:?}")]
    ToolNotFound(String),

    #[error("input failed schema validation: {0:?}")]
    InputValidationFailed(Vec<String>),

    #[error("output failed schema validation: {0:?}")]
    OutputValidationFailed(Vec<String>),

    #[error("permission denied for scopes: {0:?}")]
    PermissionDenied(Vec<String>),

    #[error("circuit breaker is open for tool {0:?}")]
    CircuitOpen(String),

    #[error("tool call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("tool execution error: {0}")]
    ExecutionError(String),

    #[error("dry run would violate policy: {0}")]
    DryRunPolicyViolation(String),

    #[error("path {0:?} is outside the allowed path set")]
    PolicyPathDenied(String),

    #[error("command {0:?} is not in the allowed command set")]
    PolicyCommandDenied(String),

    #[error("endpoint {0:?} is not in the allowed endpoint set")]
    PolicyEndpointDenied(String),

    #[error("endpoint {0:?} resolves to a disallowed (private/loopback/reserved) address")]
    Ssrf(String),

    #[error("path {0:?} matches a sensitive-file pattern and is always denied")]
    SensitiveFileDenied(String),

    #[error("no handler registered for tool {0:?}")]
    NoHandler(String),
}

impl Classified for ToolError {
    fn code(&self) -> ErrorCode {
        match self {
            ToolError::ToolNotFound(_) => ErrorCode::ToolNotFound,
            ToolError::InputValidationFailed(_) => ErrorCode::InputValidationFailed,
            ToolError::OutputValidationFailed(_) => ErrorCode::OutputValidationFailed,
            ToolError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            ToolError::CircuitOpen(_) => ErrorCode::CircuitOpen,
            ToolError::Timeout(_) => ErrorCode::Timeout,
            ToolError::ExecutionError(_) | ToolError::NoHandler(_) => ErrorCode::ExecutionError,
            ToolError::DryRunPolicyViolation(_) => ErrorCode::DryRunPolicyViolation,
            ToolError::PolicyPathDenied(_) => ErrorCode::PolicyPathDenied,
            ToolError::PolicyCommandDenied(_) => ErrorCode::PolicyCommandDenied,
            ToolError::PolicyEndpointDenied(_) => ErrorCode::PolicyEndpointDenied,
            ToolError::Ssrf(_) => ErrorCode::Ssrf,
            ToolError::SensitiveFileDenied(_) => ErrorCode::SensitiveFileDenied,
        }
    }
}
