// SPDX-License-Identifier: MIT

//! Tool manifest: the declarative description of a callable capability.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The category of runner a tool manifest declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerCategory {
    Shell,
    Http,
    Internal,
    Container,
}

/// Execution mode a tool call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Mock,
    DryRun,
    Live,
}

crate::simple_display! {
    ExecutionMode {
        Mock => "mock",
        DryRun => "dry_run",
        Live => "live",
    }
}

/// Which modes a manifest declares support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupportedModes {
    #[serde(default)]
    pub mock: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl SupportedModes {
    pub fn supports(&self, mode: ExecutionMode) -> bool {
        match mode {
            ExecutionMode::Mock => self.mock,
            ExecutionMode::DryRun => self.dry_run,
            ExecutionMode::Live => true,
        }
    }
}

/// A declarative description of a callable tool, loaded at startup and
/// immutable in memory thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub runner: RunnerCategory,
    pub input_schema: Value,
    pub output_schema: Value,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub supports: SupportedModes,
    #[serde(default)]
    pub mock_responses: Vec<Value>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ManifestValidationError {
    #[error("manifest name {0:?} does not match ^[a-z][a-z0-9_-]{{0,63}}$")]
    InvalidName(String),
    #[error("manifest version {0:?} is not valid semver")]
    InvalidVersion(String),
    #[error("permission scope {0:?} does not match ^[a-z]+:[a-z_]+:[A-Za-z0-9_./-]+$")]
    InvalidPermission(String),
    #[error("timeout_ms {0} is out of the allowed [100, 600000] range")]
    TimeoutOutOfRange(u64),
}

impl ToolManifest {
    /// Validates the structural constraints spec'd for manifests on disk:
    /// name shape, semver version, permission-scope shape, timeout bounds.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if !is_valid_manifest_name(&self.name) {
            return Err(ManifestValidationError::InvalidName(self.name.clone()));
        }
        if !is_valid_semver(&self.version) {
            return Err(ManifestValidationError::InvalidVersion(self.version.clone()));
        }
        for perm in &self.permissions {
            if !is_valid_permission_shape(perm) {
                return Err(ManifestValidationError::InvalidPermission(perm.clone()));
            }
        }
        if !(100..=600_000).contains(&self.timeout_ms) {
            return Err(ManifestValidationError::TimeoutOutOfRange(self.timeout_ms));
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

fn is_valid_manifest_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_valid_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_valid_permission_shape(perm: &str) -> bool {
    let mut parts = perm.splitn(3, ':');
    let (Some(resource), Some(action), Some(target)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if parts.next().is_some() {
        return false;
    }
    let resource_ok = !resource.is_empty() && resource.chars().all(|c| c.is_ascii_lowercase());
    let action_ok = !action.is_empty() && action.chars().all(|c| c.is_ascii_lowercase() || c == '_');
    let target_ok = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-'));
    resource_ok && action_ok && target_ok
}

/// Read-only, load-once collection of manifests keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ToolManifestMap(HashMap<String, ToolManifest>);

impl ToolManifestMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, manifest: ToolManifest) -> Result<(), ManifestValidationError> {
        manifest.validate()?;
        self.0.insert(manifest.name.clone(), manifest);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolManifest> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
