// SPDX-License-Identifier: MIT

use ak_core::{Classified, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("one or more required scopes were denied: {0:?}")]
    Denied(Vec<String>),

    #[error("derived delegation would exceed the parent session's grants")]
    DelegationOutOfBounds,

    #[error("delegation token signature does not verify")]
    SignatureInvalid,

    #[error("no signing key configured for algorithm {0:?}")]
    KeyUnavailable(ak_core::SignatureAlgorithm),

    #[error("failed to canonicalize token fields: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

impl Classified for PermissionError {
    fn code(&self) -> ErrorCode {
        match self {
            PermissionError::Denied(_) => ErrorCode::PermissionDenied,
            PermissionError::DelegationOutOfBounds => ErrorCode::DelegationOutOfBounds,
            PermissionError::SignatureInvalid | PermissionError::KeyUnavailable(_) => ErrorCode::SignatureInvalid,
            PermissionError::Canonicalize(_) => ErrorCode::InvalidEvent,
        }
    }
}
