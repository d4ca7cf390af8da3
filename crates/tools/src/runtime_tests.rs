use super::*;
use crate::handler::{HandlerContext, ToolHandler};
use ak_core::{ExecutionMode, FakeClock, GrantDecision};
use ak_journal::{Journal, JournalOptions};
use ak_permissions::{ApprovalCallback, CheckRequest, PermissionEngine};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

struct AlwaysAllow;

#[async_trait]
impl ApprovalCallback for AlwaysAllow {
    async fn decide(&self, _request: &CheckRequest, _scope: &ak_core::Scope) -> GrantDecision {
        GrantDecision::AllowSession
    }
}

struct AlwaysDeny;

#[async_trait]
impl ApprovalCallback for AlwaysDeny {
    async fn decide(&self, _request: &CheckRequest, _scope: &ak_core::Scope) -> GrantDecision {
        GrantDecision::Deny
    }
}

fn manifest(name: &str, permissions: Vec<&str>) -> ak_core::ToolManifest {
    ak_core::ToolManifest {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: "test tool".to_string(),
        runner: ak_core::RunnerCategory::Internal,
        input_schema: json!({"type": "object", "required": ["value"], "properties": {"value": {"type": "string"}}}),
        output_schema: json!({"type": "object", "required": ["ok"], "properties": {"ok": {"type": "boolean"}}}),
        permissions: permissions.into_iter().map(str::to_string).collect(),
        timeout_ms: 200,
        supports: ak_core::SupportedModes { mock: true, dry_run: true },
        mock_responses: vec![json!({"ok": true, "mock": true})],
    }
}

fn harness(
    manifests: Vec<ak_core::ToolManifest>,
    approval: impl ApprovalCallback + Send + Sync + 'static,
) -> (tempfile::TempDir, ToolRuntime) {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(Journal::init(dir.path().join("j.log"), JournalOptions { fsync: false, ..Default::default() }).unwrap());
    let permissions = Arc::new(PermissionEngine::with_clock(Box::new(approval), Box::new(FakeClock::new())));
    let mut map = ToolManifestMap::new();
    for m in manifests {
        map.insert(m).unwrap();
    }
    let runtime = ToolRuntime::with_clock(map, permissions, journal, Box::new(FakeClock::new()));
    (dir, runtime)
}

fn request(tool: &str, mode: ExecutionMode) -> ExecuteRequest {
    let mut input = Map::new();
    input.insert("value".to_string(), json!("x"));
    ExecuteRequest {
        tool: tool.to_string(),
        input,
        mode,
        policy: Policy::default(),
        session_id: ak_core::SessionId::new(),
        step_id: None,
    }
}

struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, _ctx: HandlerContext) -> Result<Value, ToolError> {
        Ok(json!({"ok": true}))
    }
}

struct SlowHandler;

#[async_trait]
impl ToolHandler for SlowHandler {
    async fn call(&self, _ctx: HandlerContext) -> Result<Value, ToolError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!({"ok": true}))
    }
}

struct BadOutputHandler;

#[async_trait]
impl ToolHandler for BadOutputHandler {
    async fn call(&self, _ctx: HandlerContext) -> Result<Value, ToolError> {
        Ok(json!({"wrong_field": 1}))
    }
}

struct AlwaysFailHandler;

#[async_trait]
impl ToolHandler for AlwaysFailHandler {
    async fn call(&self, _ctx: HandlerContext) -> Result<Value, ToolError> {
        Err(ToolError::ExecutionError("boom".to_string()))
    }
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let (_dir, runtime) = harness(vec![], AlwaysAllow);
    let err = runtime.execute(request("missing", ExecutionMode::Mock)).await.unwrap_err();
    assert!(matches!(err, ToolError::ToolNotFound(_)));
}

#[tokio::test]
async fn input_validation_failure_is_reported_without_touching_the_handler() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    let mut req = request("echo", ExecutionMode::Live);
    req.input = Map::new(); // missing required "value"
    let err = runtime.execute(req).await.unwrap_err();
    assert!(matches!(err, ToolError::InputValidationFailed(_)));
}

#[tokio::test]
async fn mock_mode_returns_the_manifests_first_mock_response_without_a_handler() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    let output = runtime.execute(request("echo", ExecutionMode::Mock)).await.unwrap();
    assert_eq!(output["mock"], json!(true));
}

#[tokio::test]
async fn dry_run_reports_policy_violations_without_touching_the_handler() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    runtime.register_handler("echo", Arc::new(AlwaysFailHandler));
    let mut req = request("echo", ExecutionMode::DryRun);
    req.input.insert("command".to_string(), json!("rm -rf /"));
    req.policy.allowed_commands = vec!["git".to_string()];
    let err = runtime.execute(req).await.unwrap_err();
    assert!(matches!(err, ToolError::DryRunPolicyViolation(_)));
}

#[tokio::test]
async fn live_mode_invokes_the_registered_handler_and_validates_output() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    runtime.register_handler("echo", Arc::new(EchoHandler));
    let output = runtime.execute(request("echo", ExecutionMode::Live)).await.unwrap();
    assert_eq!(output["ok"], json!(true));
}

#[tokio::test]
async fn live_mode_without_a_registered_handler_is_an_execution_error() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    let err = runtime.execute(request("echo", ExecutionMode::Live)).await.unwrap_err();
    assert!(matches!(err, ToolError::NoHandler(_)));
}

#[tokio::test]
async fn malformed_output_is_rejected_by_the_output_schema() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    runtime.register_handler("echo", Arc::new(BadOutputHandler));
    let err = runtime.execute(request("echo", ExecutionMode::Live)).await.unwrap_err();
    assert!(matches!(err, ToolError::OutputValidationFailed(_)));
}

#[tokio::test]
async fn missing_permission_grant_denies_the_call() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec!["filesystem:read:workspace"])], AlwaysDeny);
    runtime.register_handler("echo", Arc::new(EchoHandler));
    let err = runtime.execute(request("echo", ExecutionMode::Live)).await.unwrap_err();
    assert!(matches!(err, ToolError::PermissionDenied(_)));
}

#[tokio::test]
async fn a_slow_handler_is_cancelled_at_the_manifest_timeout() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    runtime.register_handler("echo", Arc::new(SlowHandler));
    let err = runtime.execute(request("echo", ExecutionMode::Live)).await.unwrap_err();
    assert!(matches!(err, ToolError::Timeout(_)));
}

#[tokio::test]
async fn circuit_opens_after_repeated_failures_and_then_short_circuits() {
    let (_dir, runtime) = harness(vec![manifest("echo", vec![])], AlwaysAllow);
    runtime.register_handler("echo", Arc::new(AlwaysFailHandler));
    // default breaker opens after 5 consecutive failures.
    for _ in 0..5 {
        let _ = runtime.execute(request("echo", ExecutionMode::Live)).await;
    }
    let err = runtime.execute(request("echo", ExecutionMode::Live)).await.unwrap_err();
    assert!(matches!(err, ToolError::CircuitOpen(_)));
}

#[tokio::test]
async fn pre_granted_scope_lets_a_live_call_through() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(Journal::init(dir.path().join("j.log"), JournalOptions { fsync: false, ..Default::default() }).unwrap());
    let permissions = Arc::new(PermissionEngine::with_clock(Box::new(AlwaysDeny), Box::new(FakeClock::new())));
    let req = request("echo", ExecutionMode::Live);
    permissions.pre_grant(req.session_id, &[ak_core::Scope::parse("filesystem:read:workspace").unwrap()]);
    let mut map = ToolManifestMap::new();
    map.insert(manifest("echo", vec!["filesystem:read:workspace"])).unwrap();
    let runtime = ToolRuntime::with_clock(map, permissions, journal, Box::new(FakeClock::new()));
    runtime.register_handler("echo", Arc::new(EchoHandler));
    let output = runtime.execute(req).await.unwrap();
    assert_eq!(output["ok"], json!(true));
}
