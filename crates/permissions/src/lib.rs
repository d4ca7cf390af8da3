// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ak-permissions: capability-scope grants, hierarchical session delegation,
//! and signed delegation tokens for a task execution kernel.

pub mod engine;
pub mod error;
pub mod signing;

pub use engine::{ApprovalCallback, AuditEvent, CheckOutcome, CheckRequest, DctEnforcer, PermissionEngine};
pub use error::PermissionError;
pub use signing::SigningKeys;
