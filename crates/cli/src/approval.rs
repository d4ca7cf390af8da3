// SPDX-License-Identifier: MIT

//! The two [`ApprovalCallback`] implementations `akctl` can install: one
//! that never prompts (the only safe default for a non-interactive run),
//! and one that asks on stdin/stdout.

use ak_core::{GrantDecision, Scope};
use ak_permissions::{ApprovalCallback, CheckRequest};
use async_trait::async_trait;
use std::io::Write;

/// Denies every scope outright. Grants already on the session (pre-grants,
/// delegation-derived scopes, prior `allow_always` decisions) are still
/// honored by the engine before this callback is ever consulted — this only
/// governs what happens when none of those cover the request.
pub struct AutoDeny;

#[async_trait]
impl ApprovalCallback for AutoDeny {
    async fn decide(&self, _request: &CheckRequest, _scope: &Scope) -> GrantDecision {
        GrantDecision::Deny
    }
}

/// Prompts on stdin/stdout for a one-time, session, or permanent decision.
/// Intended only for a foreground TTY session; `akctl` refuses to install
/// this callback when stdin isn't a terminal.
pub struct Interactive;

#[async_trait]
impl ApprovalCallback for Interactive {
    async fn decide(&self, request: &CheckRequest, scope: &Scope) -> GrantDecision {
        println!("tool `{}` wants scope `{}`", request.tool, scope);
        print!("allow [o]nce / [s]ession / [a]lways / [d]eny? ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return GrantDecision::Deny;
        }

        match line.trim().to_lowercase().as_str() {
            "o" | "once" => GrantDecision::AllowOnce,
            "s" | "session" => GrantDecision::AllowSession,
            "a" | "always" => GrantDecision::AllowAlways,
            _ => GrantDecision::Deny,
        }
    }
}
