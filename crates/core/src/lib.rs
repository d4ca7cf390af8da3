// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ak-core: shared types for the task execution kernel — ids, the event
//! taxonomy, the session/plan/step data model, tool manifests, permission
//! grants and delegation tokens, circuit breaker state, the stable error
//! code taxonomy, and secret redaction.

pub mod macros;

pub mod breaker;
pub mod clock;
pub mod delegation;
pub mod error;
pub mod event;
pub mod grant;
pub mod id;
pub mod manifest;
pub mod plan;
pub mod redaction;
pub mod scope;
pub mod session;

pub use breaker::{BreakerConfig, BreakerStatus, CircuitBreakerState};
pub use clock::{Clock, FakeClock, SystemClock};
pub use delegation::{derive_allowed_scopes, DelegationToken, SignatureAlgorithm, SignedFields};
pub use error::{Classified, ErrorCode};
pub use event::{Event, EventCategory, EventPayload, SessionIndex};
pub use grant::{Grant, GrantDecision, GrantTtl, Granter};
pub use id::{DelegationId, EventId, GrantId, IdBuf, PlanId, SessionId, StepId};
pub use manifest::{
    ExecutionMode, ManifestValidationError, RunnerCategory, SupportedModes, ToolManifest, ToolManifestMap,
};
pub use plan::{FailurePolicy, Plan, PlannerUsage, Step, ToolRef};
pub use redaction::{compile_default_patterns, default_patterns, redact_json, redact_text, RedactionPattern};
pub use scope::{Scope, ScopeParseError};
pub use session::{Aggregates, Limits, LimitDimension, Session, SessionStatus};
