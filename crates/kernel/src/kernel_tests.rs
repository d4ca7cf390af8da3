use super::*;
use crate::planner::ScriptedPlanner;
use ak_core::{
    ExecutionMode, FailurePolicy, FakeClock, GrantDecision, Limits, Plan, PlanId, PlannerUsage, Scope, Session,
    Step, StepId, ToolManifest, ToolManifestMap, ToolRef, RunnerCategory, SupportedModes,
};
use ak_journal::{Journal, JournalOptions};
use ak_permissions::{ApprovalCallback, CheckRequest, PermissionEngine};
use ak_tools::{HandlerContext, Policy, ToolError, ToolHandler, ToolRuntime};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

struct AlwaysAllow;

#[async_trait]
impl ApprovalCallback for AlwaysAllow {
    async fn decide(&self, _request: &CheckRequest, _scope: &Scope) -> GrantDecision {
        GrantDecision::AllowSession
    }
}

struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, _ctx: HandlerContext) -> Result<Value, ToolError> {
        Ok(json!({"ok": true}))
    }
}

fn noop_manifest() -> ToolManifest {
    ToolManifest {
        name: "noop".to_string(),
        version: "1.0.0".to_string(),
        description: "test tool".to_string(),
        runner: RunnerCategory::Internal,
        input_schema: json!({"type": "object"}),
        output_schema: json!({"type": "object"}),
        permissions: vec![],
        timeout_ms: 5_000,
        supports: SupportedModes { mock: true, dry_run: true },
        mock_responses: vec![json!({"ok": true})],
    }
}

fn step(failure_policy: FailurePolicy) -> Step {
    Step {
        id: StepId::new(),
        title: "do the thing".to_string(),
        tool: ToolRef { name: "noop".to_string(), version: None },
        input: serde_json::Map::new(),
        success_criteria: vec![],
        failure_policy,
        timeout: Duration::from_secs(5),
        max_retries: 0,
    }
}

fn plan(steps: Vec<Step>) -> Plan {
    Plan { id: PlanId::new(), schema_version: 1, goal: "finish the task".to_string(), assumptions: vec![], steps, created_at_ms: 0 }
}

fn build(planner: Box<dyn Planner>) -> (tempfile::TempDir, Kernel, Session) {
    let dir = tempfile::tempdir().unwrap();
    let journal = std::sync::Arc::new(Journal::init(dir.path().join("j.log"), JournalOptions { fsync: false, ..Default::default() }).unwrap());
    let permissions = std::sync::Arc::new(PermissionEngine::with_clock(Box::new(AlwaysAllow), Box::new(FakeClock::new())));
    let mut manifests = ToolManifestMap::new();
    manifests.insert(noop_manifest()).unwrap();
    let tools = std::sync::Arc::new(ToolRuntime::with_clock(manifests, permissions.clone(), journal.clone(), Box::new(FakeClock::new())));
    tools.register_handler("noop", std::sync::Arc::new(EchoHandler));
    let clock: std::sync::Arc<dyn Clock> = std::sync::Arc::new(FakeClock::new());
    let kernel = Kernel::with_clock(journal, permissions, tools, planner, clock);
    let session = Session::new("do the task", 0, Limits::default(), "default".to_string());
    (dir, kernel, session)
}

#[tokio::test]
async fn agentic_completion_runs_one_step_then_stops_on_an_empty_plan() {
    let scripted = ScriptedPlanner::new(vec![
        Ok((plan(vec![step(FailurePolicy::Abort)]), PlannerUsage::default())),
        Ok((plan(vec![]), PlannerUsage::default())),
    ]);
    let (_dir, kernel, session) = build(Box::new(scripted));
    let session_id = session.id;

    let (finished, findings) = kernel
        .run(session, ExecutionMode::Live, true, Policy::default(), AbortHandle::new())
        .await
        .unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Completed);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].succeeded);

    let events = kernel.journal_handle().read_session(session_id, 0, None);
    let plan_received = events.iter().filter(|e| e.kind == "planner.plan_received").count();
    let step_succeeded = events.iter().filter(|e| e.kind == "step.succeeded").count();
    let limit_exceeded = events.iter().filter(|e| e.kind == "limit.exceeded").count();
    assert_eq!(plan_received, 2);
    assert_eq!(step_succeeded, 1);
    assert_eq!(limit_exceeded, 0);
}

#[tokio::test]
async fn empty_plan_on_the_first_iteration_fails_the_session() {
    let scripted = ScriptedPlanner::new(vec![Ok((plan(vec![]), PlannerUsage::default()))]);
    let (_dir, kernel, session) = build(Box::new(scripted));
    let session_id = session.id;

    let (finished, findings) = kernel
        .run(session, ExecutionMode::Live, true, Policy::default(), AbortHandle::new())
        .await
        .unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Failed);
    assert!(findings.is_empty());

    let events = kernel.journal_handle().read_session(session_id, 0, None);
    let rejected: Vec<_> = events.iter().filter(|e| e.kind == "planner.plan_rejected").collect();
    assert_eq!(rejected.len(), 1);
    match &rejected[0].payload {
        ak_core::EventPayload::PlannerPlanRejected { reason, .. } => assert!(reason.contains("first iteration")),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn single_shot_mode_stops_after_the_first_non_empty_plan() {
    let scripted = ScriptedPlanner::new(vec![Ok((plan(vec![step(FailurePolicy::Abort)]), PlannerUsage::default()))]);
    let (_dir, kernel, session) = build(Box::new(scripted));

    let (finished, findings) = kernel
        .run(session, ExecutionMode::Live, false, Policy::default(), AbortHandle::new())
        .await
        .unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Completed);
    assert_eq!(findings.len(), 1);
}

#[tokio::test]
async fn an_abort_policy_step_failure_fails_the_whole_session() {
    let failing_step = Step { tool: ToolRef { name: "missing-tool".to_string(), version: None }, ..step(FailurePolicy::Abort) };
    let scripted = ScriptedPlanner::new(vec![Ok((plan(vec![failing_step]), PlannerUsage::default()))]);
    let (_dir, kernel, session) = build(Box::new(scripted));

    let (finished, _findings) = kernel
        .run(session, ExecutionMode::Live, true, Policy::default(), AbortHandle::new())
        .await
        .unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Failed);
}

#[tokio::test]
async fn a_continue_policy_step_failure_lets_the_session_finish() {
    let failing_step = Step { tool: ToolRef { name: "missing-tool".to_string(), version: None }, ..step(FailurePolicy::Continue) };
    let scripted = ScriptedPlanner::new(vec![
        Ok((plan(vec![failing_step]), PlannerUsage::default())),
        Ok((plan(vec![]), PlannerUsage::default())),
    ]);
    let (_dir, kernel, session) = build(Box::new(scripted));

    let (finished, findings) = kernel
        .run(session, ExecutionMode::Live, true, Policy::default(), AbortHandle::new())
        .await
        .unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Completed);
    assert_eq!(findings.len(), 1);
    assert!(!findings[0].succeeded);
}

#[tokio::test]
async fn a_token_limit_breached_before_the_first_plan_call_fails_immediately() {
    let scripted = ScriptedPlanner::new(vec![Ok((plan(vec![step(FailurePolicy::Abort)]), PlannerUsage::default()))]);
    let (_dir, kernel, mut session) = build(Box::new(scripted));
    session.limits.max_tokens = Some(0);
    session.aggregates.tokens_used = 1;

    let (finished, _findings) = kernel
        .run(session, ExecutionMode::Live, true, Policy::default(), AbortHandle::new())
        .await
        .unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Failed);
}

#[tokio::test]
async fn an_abort_signal_set_before_the_loop_starts_stops_it_immediately() {
    let scripted = ScriptedPlanner::new(vec![Ok((plan(vec![step(FailurePolicy::Abort)]), PlannerUsage::default()))]);
    let (_dir, kernel, session) = build(Box::new(scripted));
    let abort = AbortHandle::new();
    abort.abort("operator requested stop");

    let (finished, findings) = kernel.run(session, ExecutionMode::Live, true, Policy::default(), abort).await.unwrap();

    assert_eq!(finished.status, ak_core::SessionStatus::Aborted);
    assert!(findings.is_empty());
}
