// SPDX-License-Identifier: MIT

//! Loads a plan from a JSON file on disk. There is no LLM-backed planner in
//! this workspace (out of scope per the platform's own boundaries), so
//! `akctl run` takes its plan as a literal file: a JSON array of steps, ids
//! and timestamps filled in by the CLI rather than authored by hand.

use ak_core::{FailurePolicy, Plan, PlanId, Step, StepId, ToolRef};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct StepSpec {
    title: String,
    tool: String,
    #[serde(default)]
    tool_version: Option<String>,
    #[serde(default)]
    input: Map<String, Value>,
    #[serde(default)]
    success_criteria: Vec<String>,
    #[serde(default = "default_failure_policy")]
    failure_policy: FailurePolicy,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default)]
    max_retries: u32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Abort
}

/// Reads a plan file and turns it into a single [`Plan`] with a freshly
/// minted [`PlanId`] and per-step [`StepId`]s.
pub fn load(path: &Path, goal: &str, created_at_ms: u64) -> anyhow::Result<Plan> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading plan file {}: {e}", path.display()))?;
    let specs: Vec<StepSpec> = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("parsing plan file {}: {e}", path.display()))?;

    let steps = specs
        .into_iter()
        .map(|spec| Step {
            id: StepId::new(),
            title: spec.title,
            tool: ToolRef { name: spec.tool, version: spec.tool_version },
            input: spec.input,
            success_criteria: spec.success_criteria,
            failure_policy: spec.failure_policy,
            timeout: Duration::from_millis(spec.timeout_ms),
            max_retries: spec.max_retries,
        })
        .collect();

    Ok(Plan {
        id: PlanId::new(),
        schema_version: 1,
        goal: goal.to_string(),
        assumptions: vec![],
        steps,
        created_at_ms,
    })
}
