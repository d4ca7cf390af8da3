// SPDX-License-Identifier: MIT

//! The planner seam. A planner turns a task, the tools it's allowed to use,
//! and what's happened so far into the next batch of steps to run — or an
//! empty plan once the task is done.

use ak_core::{Limits, Plan, PlannerUsage, Session, ToolManifestMap};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A finding recorded from a completed step, carried forward into the next
/// planner call so it can decide whether the task is actually finished.
#[derive(Debug, Clone)]
pub struct Finding {
    pub step_id: String,
    pub tool: String,
    pub succeeded: bool,
    pub output: serde_json::Value,
}

/// Everything the planner sees about the session's progress so far. Built
/// fresh by the Kernel before each `generate_plan` call.
pub struct StateSnapshot<'a> {
    pub session: &'a Session,
    pub findings: &'a [Finding],
}

/// Produces the next [`Plan`] for a running session. Exceptions are never
/// allowed to propagate past a planner call site: implementations return
/// `Err` for anything that went wrong, and the Kernel turns that into a
/// `planner.error` event rather than unwinding.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_plan(
        &self,
        task: &str,
        tool_schemas: &ToolManifestMap,
        snapshot: &StateSnapshot<'_>,
        constraints: &Limits,
    ) -> anyhow::Result<(Plan, PlannerUsage)>;
}

/// Returns the same plan (or the same error) every call. Useful for tests
/// that only care about a single iteration's behavior.
pub struct MockPlanner {
    pub plan: Plan,
    pub usage: PlannerUsage,
}

#[async_trait]
impl Planner for MockPlanner {
    async fn generate_plan(
        &self,
        _task: &str,
        _tool_schemas: &ToolManifestMap,
        _snapshot: &StateSnapshot<'_>,
        _constraints: &Limits,
    ) -> anyhow::Result<(Plan, PlannerUsage)> {
        Ok((self.plan.clone(), self.usage))
    }
}

/// Replays a fixed script of plans, one per call, in order. Once the script
/// is exhausted it keeps returning the last entry — tests that need the
/// session to keep running past the scripted steps don't have to pad the
/// script with repeats of the final "done" plan.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<anyhow::Result<(Plan, PlannerUsage)>>>,
    last: Mutex<Option<(Plan, PlannerUsage)>>,
}

impl ScriptedPlanner {
    pub fn new(script: Vec<anyhow::Result<(Plan, PlannerUsage)>>) -> Self {
        Self { script: Mutex::new(script.into()), last: Mutex::new(None) }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn generate_plan(
        &self,
        _task: &str,
        _tool_schemas: &ToolManifestMap,
        _snapshot: &StateSnapshot<'_>,
        _constraints: &Limits,
    ) -> anyhow::Result<(Plan, PlannerUsage)> {
        let next = self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front();
        match next {
            Some(Ok(plan_and_usage)) => {
                *self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(plan_and_usage.clone());
                Ok(plan_and_usage)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
                .ok_or_else(|| anyhow::anyhow!("scripted planner exhausted with no prior plan to repeat")),
        }
    }
}
