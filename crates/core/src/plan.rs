// SPDX-License-Identifier: MIT

//! Plan and Step: the planner's output and the Kernel's unit of execution.

use crate::id::{PlanId, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    Abort,
    Continue,
    Retry,
}

crate::simple_display! {
    FailurePolicy {
        Abort => "abort",
        Continue => "continue",
        Retry => "retry",
    }
}

/// Reference to a tool manifest by name and optional version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A single tool invocation inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub title: String,
    pub tool: ToolRef,
    pub input: Map<String, Value>,
    pub success_criteria: Vec<String>,
    pub failure_policy: FailurePolicy,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Step {
    /// A step is executed at most `max_retries + 1` times per plan.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// The planner's output: an ordered, immutable sequence of steps.
///
/// A plan with zero steps signals "work complete" on iteration >= 1; on
/// iteration 0 it is rejected as degenerate by the Kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub schema_version: u32,
    pub goal: String,
    pub assumptions: Vec<String>,
    pub steps: Vec<Step>,
    pub created_at_ms: u64,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Token/cost usage reported alongside a planner call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(max_retries: u32) -> Step {
        Step {
            id: StepId::new(),
            title: "do a thing".into(),
            tool: ToolRef { name: "shell".into(), version: None },
            input: Map::new(),
            success_criteria: vec![],
            failure_policy: FailurePolicy::Retry,
            timeout: Duration::from_secs(5),
            max_retries,
        }
    }

    #[test]
    fn max_attempts_is_retries_plus_one() {
        assert_eq!(step(0).max_attempts(), 1);
        assert_eq!(step(3).max_attempts(), 4);
    }

    #[test]
    fn empty_plan_reports_is_empty() {
        let plan = Plan {
            id: PlanId::new(),
            schema_version: 1,
            goal: "finish".into(),
            assumptions: vec![],
            steps: vec![],
            created_at_ms: 0,
        };
        assert!(plan.is_empty());
    }

    #[test]
    fn step_timeout_roundtrips_as_milliseconds() {
        let s = step(0);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["timeout"], 5000);
        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Duration::from_secs(5));
    }
}
