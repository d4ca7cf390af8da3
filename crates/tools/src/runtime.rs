// SPDX-License-Identifier: MIT

//! The tool runtime: resolves a manifest, validates input, checks
//! permissions, dispatches by execution mode, enforces a timeout, validates
//! output, updates the circuit breaker, and journals the outcome.

use crate::error::ToolError;
use crate::handler::{HandlerContext, ToolHandler};
use crate::policy::Policy;
use crate::schema::SchemaCache;
use ak_core::{
    BreakerConfig, Classified, Clock, CircuitBreakerState, EventPayload, ExecutionMode, Scope, SessionId, StepId,
    SystemClock, ToolManifestMap,
};
use ak_journal::Journal;
use ak_permissions::{CheckRequest, PermissionEngine};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A single tool invocation request, assembled by the Kernel from a plan
/// step.
pub struct ExecuteRequest {
    pub tool: String,
    pub input: Map<String, Value>,
    pub mode: ExecutionMode,
    pub policy: Policy,
    pub session_id: SessionId,
    pub step_id: Option<StepId>,
}

struct BreakerEntry {
    config: BreakerConfig,
    state: CircuitBreakerState,
}

/// Wires together the manifest registry, the permission engine, per-tool
/// circuit breakers, the schema validator cache, and the journal into the
/// ten-step execution sequence.
pub struct ToolRuntime {
    manifests: ToolManifestMap,
    permissions: Arc<PermissionEngine>,
    journal: Arc<Journal>,
    clock: Box<dyn Clock>,
    schemas: SchemaCache,
    handlers: Mutex<HashMap<String, Arc<dyn ToolHandler>>>,
    breakers: Mutex<HashMap<String, BreakerEntry>>,
    default_breaker_config: BreakerConfig,
}

impl ToolRuntime {
    pub fn new(manifests: ToolManifestMap, permissions: Arc<PermissionEngine>, journal: Arc<Journal>) -> Self {
        Self::with_clock(manifests, permissions, journal, Box::new(SystemClock))
    }

    pub fn with_clock(
        manifests: ToolManifestMap,
        permissions: Arc<PermissionEngine>,
        journal: Arc<Journal>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            manifests,
            permissions,
            journal,
            clock,
            schemas: SchemaCache::new(256),
            handlers: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
            default_breaker_config: BreakerConfig::default(),
        }
    }

    pub fn register_handler(&self, tool: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.lock().insert(tool.into(), handler);
    }

    /// The registered manifest set, handed to the planner on every call so
    /// it knows what tools it may reference.
    pub fn manifests(&self) -> &ToolManifestMap {
        &self.manifests
    }

    pub fn breaker_status(&self, tool: &str) -> ak_core::BreakerStatus {
        let breakers = self.breakers.lock();
        match breakers.get(tool) {
            Some(entry) => entry.state.effective_status(&entry.config, self.clock.epoch_ms()),
            None => ak_core::BreakerStatus::Closed,
        }
    }

    pub async fn execute(&self, request: ExecuteRequest) -> Result<Value, ToolError> {
        let manifest = self
            .manifests
            .get(&request.tool)
            .cloned()
            .ok_or_else(|| ToolError::ToolNotFound(request.tool.clone()))?;

        let input_errors = self.schemas.validate(&manifest.input_schema, &Value::Object(request.input.clone()));
        if !input_errors.is_empty() {
            return Err(ToolError::InputValidationFailed(input_errors));
        }

        if !self.admit(&request.tool) {
            return Err(ToolError::CircuitOpen(request.tool.clone()));
        }

        let scopes: Vec<Scope> = manifest
            .permissions
            .iter()
            .filter_map(|p| match Scope::parse(p) {
                Ok(scope) => Some(scope),
                Err(error) => {
                    tracing::warn!(%error, scope = %p, "manifest declares an unparseable permission scope");
                    None
                }
            })
            .collect();
        if !scopes.is_empty() {
            let outcome = self
                .permissions
                .check(CheckRequest {
                    session_id: request.session_id,
                    step_id: request.step_id,
                    tool: request.tool.clone(),
                    scopes,
                })
                .await;
            if !outcome.allowed {
                let denied: Vec<String> = outcome.denials.iter().map(ToString::to_string).collect();
                return Err(ToolError::PermissionDenied(denied));
            }
        }

        self.journal_tool_started(&request);

        let result = match request.mode {
            ExecutionMode::Mock => Ok(manifest.mock_responses.first().cloned().unwrap_or_else(|| json!({}))),
            ExecutionMode::DryRun => match self.dry_run_preflight(&request) {
                Ok(()) => Ok(json!({"would_execute": request.tool, "input": request.input})),
                Err(reason) => Err(ToolError::DryRunPolicyViolation(reason)),
            },
            ExecutionMode::Live => self.run_live(&request, &manifest.timeout()).await,
        };

        match result {
            Ok(output) => {
                if request.mode == ExecutionMode::Live {
                    let output_errors = self.schemas.validate(&manifest.output_schema, &output);
                    if !output_errors.is_empty() {
                        self.record_breaker_outcome(&request.tool, false);
                        return Err(self.finish_err(&request, ToolError::OutputValidationFailed(output_errors)));
                    }
                }
                if request.mode == ExecutionMode::Live {
                    self.record_breaker_outcome(&request.tool, true);
                }
                self.journal_tool_succeeded(&request);
                Ok(output)
            }
            Err(err) => {
                if !matches!(err, ToolError::DryRunPolicyViolation(_) | ToolError::PermissionDenied(_)) {
                    self.record_breaker_outcome(&request.tool, false);
                }
                Err(self.finish_err(&request, err))
            }
        }
    }

    async fn run_live(&self, request: &ExecuteRequest, timeout: &std::time::Duration) -> Result<Value, ToolError> {
        let handler = self.handlers.lock().get(&request.tool).cloned();
        let Some(handler) = handler else {
            return Err(ToolError::NoHandler(request.tool.clone()));
        };
        let ctx = HandlerContext {
            input: request.input.clone(),
            policy: request.policy.clone(),
            timeout: *timeout,
        };
        match tokio::time::timeout(*timeout, handler.call(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(*timeout)),
        }
    }

    /// Mode-specific "would it fail policy" preflight for dry_run. The
    /// built-in handlers expose no separate preflight hook today, so this
    /// re-derives the obvious checks from the request's own policy profile:
    /// a command field is checked against `allowed_commands`, a path field
    /// against `allowed_paths`/sensitive files.
    fn dry_run_preflight(&self, request: &ExecuteRequest) -> Result<(), String> {
        if let Some(command) = request.input.get("command").and_then(Value::as_str) {
            request.policy.check_command(command).map_err(|e| e.to_string())?;
        }
        if let Some(path) = request.input.get("path").and_then(Value::as_str) {
            request.policy.check_read_path(std::path::Path::new(path)).map_err(|e| e.to_string())?;
        }
        if let Some(url) = request.input.get("url").and_then(Value::as_str) {
            request.policy.check_endpoint(url).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn admit(&self, tool: &str) -> bool {
        let mut breakers = self.breakers.lock();
        let entry = breakers
            .entry(tool.to_string())
            .or_insert_with(|| BreakerEntry { config: self.default_breaker_config, state: CircuitBreakerState::default() });
        entry.state.should_admit(&entry.config, self.clock.epoch_ms())
    }

    fn record_breaker_outcome(&self, tool: &str, success: bool) {
        let mut breakers = self.breakers.lock();
        let entry = breakers
            .entry(tool.to_string())
            .or_insert_with(|| BreakerEntry { config: self.default_breaker_config, state: CircuitBreakerState::default() });
        let now_ms = self.clock.epoch_ms();
        if success {
            entry.state.record_success();
        } else {
            entry.state.record_failure(&entry.config, now_ms);
        }
    }

    fn journal_tool_started(&self, request: &ExecuteRequest) {
        let _ = self.journal.try_emit(
            request.session_id,
            EventPayload::ToolStarted {
                tool: request.tool.clone(),
                mode: request.mode.to_string(),
                extra: Map::new(),
            },
        );
    }

    fn journal_tool_succeeded(&self, request: &ExecuteRequest) {
        let _ = self.journal.try_emit(
            request.session_id,
            EventPayload::ToolSucceeded { tool: request.tool.clone(), elapsed_ms: 0, extra: Map::new() },
        );
    }

    fn finish_err(&self, request: &ExecuteRequest, err: ToolError) -> ToolError {
        let _ = self.journal.try_emit(
            request.session_id,
            EventPayload::ToolFailed {
                tool: request.tool.clone(),
                code: err.code(),
                reason: err.to_string(),
                extra: Map::new(),
            },
        );
        err
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
