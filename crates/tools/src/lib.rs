// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ak-tools: schema-validated tool invocation, execution modes, per-tool
//! circuit breakers, and policy enforcement (paths, commands, endpoints,
//! SSRF) for a task execution kernel.

pub mod error;
pub mod handler;
pub mod policy;
pub mod runtime;
pub mod schema;

pub use error::ToolError;
pub use handler::{HandlerContext, ShellHandler, ToolHandler};
pub use policy::Policy;
pub use runtime::{ExecuteRequest, ToolRuntime};
pub use schema::SchemaCache;
