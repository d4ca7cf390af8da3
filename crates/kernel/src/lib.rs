// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ak-kernel: the agentic execution loop. Alternates planner calls with
//! step execution through the Tool Runtime, enforces global budgets, drives
//! session state transitions, and delegates subtasks to child sessions.

pub mod abort;
pub mod error;
pub mod kernel;
pub mod planner;
pub mod subagent;

pub use abort::AbortHandle;
pub use error::{KernelError, SessionFailure};
pub use kernel::Kernel;
pub use planner::{Finding, MockPlanner, Planner, ScriptedPlanner, StateSnapshot};
pub use subagent::{SubagentOutcome, SubagentRequest};
