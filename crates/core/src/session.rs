// SPDX-License-Identifier: MIT

//! Session state: the execution context for one task, from submission to a
//! terminal state.

use crate::id::SessionId;
use serde::{Deserialize, Serialize};

/// Current status of a session. Terminal on any of `Completed`, `Failed`,
/// `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Aborted)
    }
}

crate::simple_display! {
    SessionStatus {
        Created => "created",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Aborted => "aborted",
    }
}

/// Global budget enforced by the Kernel before each plan call and before
/// each step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub max_tokens: Option<u64>,
    pub max_cost_usd: Option<f64>,
    pub max_duration_ms: Option<u64>,
    pub max_iterations: Option<u32>,
    pub max_steps: Option<u32>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_cost_usd: None,
            max_duration_ms: None,
            max_iterations: None,
            max_steps: None,
        }
    }
}

/// Which budget dimension fired, reported on `limit.exceeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitDimension {
    Tokens,
    CostUsd,
    DurationMs,
    Iterations,
    Steps,
}

crate::simple_display! {
    LimitDimension {
        Tokens => "tokens",
        CostUsd => "cost_usd",
        DurationMs => "duration_ms",
        Iterations => "iterations",
        Steps => "steps",
    }
}

/// Running totals accumulated over the life of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub tokens_used: u64,
    pub cost_used: f64,
    pub elapsed_ms: u64,
    pub iteration_count: u32,
    pub step_count: u32,
}

impl Aggregates {
    /// Returns the first limit dimension this would breach, if any, without
    /// mutating state. Checked before each plan call and before each step
    /// per the Kernel's main loop contract.
    pub fn first_breach(&self, limits: &Limits) -> Option<LimitDimension> {
        if let Some(max) = limits.max_tokens {
            if self.tokens_used > max {
                return Some(LimitDimension::Tokens);
            }
        }
        if let Some(max) = limits.max_cost_usd {
            if self.cost_used > max {
                return Some(LimitDimension::CostUsd);
            }
        }
        if let Some(max) = limits.max_duration_ms {
            if self.elapsed_ms > max {
                return Some(LimitDimension::DurationMs);
            }
        }
        if let Some(max) = limits.max_iterations {
            if self.iteration_count > max {
                return Some(LimitDimension::Iterations);
            }
        }
        if let Some(max) = limits.max_steps {
            if self.step_count > max {
                return Some(LimitDimension::Steps);
            }
        }
        None
    }
}

/// One task's execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub task: String,
    pub created_at_ms: u64,
    pub status: SessionStatus,
    pub aggregates: Aggregates,
    pub limits: Limits,
    pub policy_profile: String,
}

impl Session {
    pub fn new(task: impl Into<String>, created_at_ms: u64, limits: Limits, policy_profile: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            task: task.into(),
            created_at_ms,
            status: SessionStatus::Created,
            aggregates: Aggregates::default(),
            limits,
            policy_profile: policy_profile.into(),
        }
    }
}
