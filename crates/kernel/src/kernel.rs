// SPDX-License-Identifier: MIT

//! The main loop: create a session, alternate planner calls with step
//! execution, enforce global limits, and drive the session to a terminal
//! state. Every transition is journaled before `run` returns.

use crate::abort::AbortHandle;
use crate::error::{KernelError, SessionFailure};
use crate::planner::{Finding, Planner, StateSnapshot};
use crate::subagent::{SubagentOutcome, SubagentRequest};
use ak_core::{
    Classified, Clock, ErrorCode, EventPayload, ExecutionMode, FailurePolicy, Session, SessionStatus, Step,
    SystemClock,
};
use ak_journal::Journal;
use ak_permissions::PermissionEngine;
use ak_tools::{ExecuteRequest, Policy, ToolRuntime};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Wires the Journal, Permission Engine, and Tool Runtime together with a
/// planner into the agentic execution loop.
pub struct Kernel {
    journal: Arc<Journal>,
    permissions: Arc<PermissionEngine>,
    tools: Arc<ToolRuntime>,
    planner: Box<dyn Planner>,
    clock: Arc<dyn Clock>,
}

impl Kernel {
    pub fn new(
        journal: Arc<Journal>,
        permissions: Arc<PermissionEngine>,
        tools: Arc<ToolRuntime>,
        planner: Box<dyn Planner>,
    ) -> Self {
        Self::with_clock(journal, permissions, tools, planner, Arc::new(SystemClock))
    }

    pub fn with_clock(
        journal: Arc<Journal>,
        permissions: Arc<PermissionEngine>,
        tools: Arc<ToolRuntime>,
        planner: Box<dyn Planner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { journal, permissions, tools, planner, clock }
    }

    pub fn permissions(&self) -> &Arc<PermissionEngine> {
        &self.permissions
    }

    pub fn journal_handle(&self) -> &Arc<Journal> {
        &self.journal
    }

    /// Runs `session` to a terminal status, alternating planner calls with
    /// step execution per the agentic loop contract. Returns `Ok` with the
    /// session in its final status for every outcome the loop can itself
    /// journal — `Err` is reserved for the one case it can't: the journal
    /// failing to take the write in the first place.
    pub async fn run(
        &self,
        mut session: Session,
        mode: ExecutionMode,
        agentic: bool,
        policy: Policy,
        abort: AbortHandle,
    ) -> Result<(Session, Vec<Finding>), KernelError> {
        self.journal.emit(session.id, EventPayload::SessionCreated { task: session.task.clone(), extra: Map::new() })?;
        session.status = SessionStatus::Running;
        self.journal.emit(session.id, EventPayload::SessionStarted { extra: Map::new() })?;

        let mut findings: Vec<Finding> = Vec::new();
        let mut iteration: u32 = 0;

        loop {
            session.aggregates.elapsed_ms = self.clock.epoch_ms().saturating_sub(session.created_at_ms);

            if abort.is_aborted() {
                self.finish_aborted(&mut session, abort.reason())?;
                break;
            }

            if let Some(dim) = session.aggregates.first_breach(&session.limits) {
                self.finish_limit_exceeded(&mut session, dim)?;
                break;
            }

            self.journal.emit(session.id, EventPayload::PlannerRequested { iteration, extra: Map::new() })?;

            let snapshot = StateSnapshot { session: &session, findings: &findings };
            let plan_result =
                self.planner.generate_plan(&session.task, self.tools.manifests(), &snapshot, &session.limits).await;

            let (plan, usage) = match plan_result {
                Ok(p) => p,
                Err(e) => {
                    let reason = e.to_string();
                    self.journal.emit(session.id, EventPayload::PlannerError {
                        iteration,
                        reason: reason.clone(),
                        extra: Map::new(),
                    })?;
                    self.finish_failed(&mut session, SessionFailure::PlannerError(reason))?;
                    break;
                }
            };

            session.aggregates.tokens_used = session.aggregates.tokens_used.saturating_add(usage.total_tokens);
            session.aggregates.cost_used += usage.cost_usd;

            self.journal.emit(session.id, EventPayload::PlannerPlanReceived {
                iteration,
                step_count: plan.steps.len(),
                tokens_used: session.aggregates.tokens_used,
                extra: Map::new(),
            })?;

            if plan.is_empty() {
                if iteration == 0 {
                    self.journal.emit(session.id, EventPayload::PlannerPlanRejected {
                        iteration,
                        reason: "empty plan on first iteration".to_string(),
                        extra: Map::new(),
                    })?;
                    self.finish_failed(&mut session, SessionFailure::PlannerEmptyInitial)?;
                } else {
                    self.finish_completed(&mut session, iteration)?;
                }
                break;
            }

            let step_outcome = self.run_plan_steps(&mut session, &plan.steps, mode, &policy, &mut findings, &abort).await?;

            if abort.is_aborted() {
                self.finish_aborted(&mut session, abort.reason())?;
                break;
            }

            if let Some(failure) = step_outcome {
                self.finish_failed(&mut session, failure)?;
                break;
            }

            if let Some(dim) = session.aggregates.first_breach(&session.limits) {
                self.finish_limit_exceeded(&mut session, dim)?;
                break;
            }

            iteration = iteration.saturating_add(1);
            session.aggregates.iteration_count = iteration;

            if !agentic {
                self.finish_completed(&mut session, iteration)?;
                break;
            }
        }

        Ok((session, findings))
    }

    /// Runs one plan's worth of steps in order, stopping early on abort, a
    /// limit breach, or an `abort`-policy step failure. Returns `Some` with
    /// the reason the session should now terminate as failed, or `None` if
    /// every step ran to a resolution the plan's policies tolerate.
    async fn run_plan_steps(
        &self,
        session: &mut Session,
        steps: &[Step],
        mode: ExecutionMode,
        policy: &Policy,
        findings: &mut Vec<Finding>,
        abort: &AbortHandle,
    ) -> Result<Option<SessionFailure>, KernelError> {
        for step in steps {
            session.aggregates.elapsed_ms = self.clock.epoch_ms().saturating_sub(session.created_at_ms);

            if abort.is_aborted() {
                return Ok(None);
            }
            if let Some(dim) = session.aggregates.first_breach(&session.limits) {
                self.finish_limit_exceeded(session, dim)?;
                return Ok(None);
            }

            let result = self.run_step(session, step, mode, policy).await?;
            session.aggregates.step_count = session.aggregates.step_count.saturating_add(1);

            match result {
                Ok(output) => {
                    findings.push(Finding {
                        step_id: step.id.to_string(),
                        tool: step.tool.name.clone(),
                        succeeded: true,
                        output,
                    });
                }
                Err((code, reason)) => {
                    findings.push(Finding {
                        step_id: step.id.to_string(),
                        tool: step.tool.name.clone(),
                        succeeded: false,
                        output: Value::Null,
                    });
                    match step.failure_policy {
                        FailurePolicy::Continue => continue,
                        FailurePolicy::Abort | FailurePolicy::Retry => {
                            return Ok(Some(SessionFailure::StepAborted {
                                step_id: step.id.to_string(),
                                code,
                                reason,
                            }));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// Runs a single step, retrying up to `max_attempts` only when its
    /// failure policy is `Retry`; any other policy gets exactly one
    /// attempt, since retrying without that policy set would violate the
    /// planner's own instruction for what to do when this step fails.
    async fn run_step(
        &self,
        session: &Session,
        step: &Step,
        mode: ExecutionMode,
        policy: &Policy,
    ) -> Result<Result<Value, (ErrorCode, String)>, KernelError> {
        let attempts = step.max_attempts();
        let mut last: Option<(ErrorCode, String)> = None;

        for attempt in 1..=attempts {
            self.journal.emit(session.id, EventPayload::StepStarted {
                step_id: step.id.to_string(),
                title: step.title.clone(),
                tool: step.tool.name.clone(),
                attempt,
                extra: Map::new(),
            })?;

            let request = ExecuteRequest {
                tool: step.tool.name.clone(),
                input: step.input.clone(),
                mode,
                policy: policy.clone(),
                session_id: session.id,
                step_id: Some(step.id),
            };

            match self.tools.execute(request).await {
                Ok(output) => {
                    self.journal.emit(session.id, EventPayload::StepSucceeded {
                        step_id: step.id.to_string(),
                        attempt,
                        extra: Map::new(),
                    })?;
                    return Ok(Ok(output));
                }
                Err(e) => {
                    let code = e.code();
                    let reason = e.to_string();
                    self.journal.emit(session.id, EventPayload::StepFailed {
                        step_id: step.id.to_string(),
                        attempt,
                        code,
                        reason: reason.clone(),
                        extra: Map::new(),
                    })?;
                    last = Some((code, reason));
                    if step.failure_policy != FailurePolicy::Retry {
                        break;
                    }
                }
            }
        }

        Ok(Err(last.unwrap_or((ErrorCode::ExecutionError, "step produced no attempts".to_string()))))
    }

    fn finish_completed(&self, session: &mut Session, iteration: u32) -> Result<(), KernelError> {
        session.status = SessionStatus::Completed;
        self.journal.emit(session.id, EventPayload::SessionCompleted {
            iterations: iteration,
            steps: session.aggregates.step_count,
            extra: Map::new(),
        })?;
        Ok(())
    }

    fn finish_failed(&self, session: &mut Session, failure: SessionFailure) -> Result<(), KernelError> {
        session.status = SessionStatus::Failed;
        self.journal.emit(session.id, EventPayload::SessionFailed {
            code: failure.code(),
            reason: failure.to_string(),
            extra: Map::new(),
        })?;
        Ok(())
    }

    fn finish_limit_exceeded(&self, session: &mut Session, dim: ak_core::LimitDimension) -> Result<(), KernelError> {
        let (limit, used) = limit_and_used(&session.limits, &session.aggregates, dim);
        self.journal.emit(session.id, EventPayload::LimitExceeded {
            dimension: dim.to_string(),
            limit,
            used,
            extra: Map::new(),
        })?;
        self.finish_failed(session, SessionFailure::LimitExceeded(dim))
    }

    fn finish_aborted(&self, session: &mut Session, reason: String) -> Result<(), KernelError> {
        session.status = SessionStatus::Aborted;
        self.journal.emit(session.id, EventPayload::SessionAborted { reason, extra: Map::new() })?;
        Ok(())
    }

    /// Spins up a child session under a derived delegation token and runs
    /// it to completion with this same Kernel's Journal/PermissionEngine/
    /// ToolRuntime, but the subagent request's own planner and budget. A
    /// child session never propagates its failure as an error to the
    /// caller — it's folded into the returned status instead, since a
    /// delegated subtask failing is an ordinary outcome for the parent
    /// step that spawned it, not an exceptional one.
    pub async fn run_subagent(&self, request: SubagentRequest) -> SubagentOutcome {
        crate::subagent::run_subagent(self, request).await
    }

    pub fn tools(&self) -> &Arc<ToolRuntime> {
        &self.tools
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn limit_and_used(limits: &ak_core::Limits, aggregates: &ak_core::Aggregates, dim: ak_core::LimitDimension) -> (f64, f64) {
    use ak_core::LimitDimension::*;
    match dim {
        Tokens => (limits.max_tokens.unwrap_or_default() as f64, aggregates.tokens_used as f64),
        CostUsd => (limits.max_cost_usd.unwrap_or_default(), aggregates.cost_used),
        DurationMs => (limits.max_duration_ms.unwrap_or_default() as f64, aggregates.elapsed_ms as f64),
        Iterations => (limits.max_iterations.unwrap_or_default() as f64, aggregates.iteration_count as f64),
        Steps => (limits.max_steps.unwrap_or_default() as f64, aggregates.step_count as f64),
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
