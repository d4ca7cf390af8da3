// SPDX-License-Identifier: MIT

//! The handler seam: the one piece of a tool the runtime can't provide
//! generically, since it is the part that actually touches the outside
//! world.

use crate::error::ToolError;
use crate::policy::Policy;
use ak_core::{compile_default_patterns, redact_text, RedactionPattern};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// Context a handler needs to do its work: the validated input, the policy
/// profile to enforce, and the manifest's declared timeout (informational;
/// the runtime itself races the call against this independently).
pub struct HandlerContext {
    pub input: Map<String, Value>,
    pub policy: Policy,
    pub timeout: Duration,
}

/// A tool's live implementation. Registered against a manifest name in the
/// runtime's handler table; invoked only when a call resolves to
/// `ExecutionMode::Live`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: HandlerContext) -> Result<Value, ToolError>;
}

/// Runs a shell command through `sh -c`, subject to the policy's command
/// allowlist, with stdout/stderr captured and run through [`redact_text`]
/// before being returned.
pub struct ShellHandler {
    patterns: Vec<RedactionPattern>,
}

impl ShellHandler {
    pub fn new() -> Self {
        Self { patterns: compile_default_patterns() }
    }
}

impl Default for ShellHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ShellHandler {
    async fn call(&self, ctx: HandlerContext) -> Result<Value, ToolError> {
        let command = ctx
            .input
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::ExecutionError("missing \"command\" field".to_string()))?;
        ctx.policy.check_command(command)?;

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        let output = cmd.output().await.map_err(|e| ToolError::ExecutionError(e.to_string()))?;

        let patterns: Vec<&RedactionPattern> = self.patterns.iter().collect();
        let stdout = redact_text(&String::from_utf8_lossy(&output.stdout), &patterns);
        let stderr = redact_text(&String::from_utf8_lossy(&output.stderr), &patterns);

        Ok(serde_json::json!({
            "exit_code": output.status.code().unwrap_or(-1),
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}
