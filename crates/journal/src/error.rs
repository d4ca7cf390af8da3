// SPDX-License-Identifier: MIT

use ak_core::{Classified, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal hash chain broken at event index {index}: expected prev_hash {expected:?}, found {found:?}")]
    HashMismatch { index: u64, expected: String, found: Option<String> },

    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal line at offset {offset} is not valid JSON: {source}")]
    InvalidEvent { offset: u64, #[source] source: serde_json::Error },

    #[error("event failed schema validation: {0}")]
    EventSchemaInvalid(String),

    #[error("journal is locked by another writer")]
    Locked,

    #[error("insufficient free space to continue writing the journal")]
    Full,
}

impl Classified for JournalError {
    fn code(&self) -> ErrorCode {
        match self {
            JournalError::HashMismatch { .. } => ErrorCode::JournalHashMismatch,
            JournalError::Io(_) => ErrorCode::JournalIoError,
            JournalError::InvalidEvent { .. } | JournalError::EventSchemaInvalid(_) => ErrorCode::InvalidEvent,
            JournalError::Locked => ErrorCode::JournalIoError,
            JournalError::Full => ErrorCode::JournalFull,
        }
    }
}
