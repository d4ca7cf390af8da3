// SPDX-License-Identifier: MIT

//! On-disk configuration for `akctl`: an optional TOML file merged with CLI
//! flags, flag always wins over file, file always wins over built-in
//! default. The file lives at `--config <path>` or, failing that,
//! `$AK_CONFIG_DIR/config.toml` with `$AK_CONFIG_DIR` falling back to the
//! platform config directory (`dirs::config_dir()`).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Approval mode for permission checks that don't already hold a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Prompt on stdin/stdout. Refuses to run if stdin isn't a TTY.
    Interactive,
    /// Deny every scope that isn't already pre-granted. The only mode that
    /// makes sense for a non-interactive run (CI, cron, a subagent).
    AutoDeny,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub journal_path: PathBuf,
    pub fsync: bool,
    pub redact: bool,
    pub tool_manifest_dir: Option<PathBuf>,
    pub max_tokens: Option<u64>,
    pub max_cost_usd: Option<f64>,
    pub max_duration_ms: Option<u64>,
    pub max_iterations: Option<u32>,
    pub max_steps: Option<u32>,
    pub approval_mode: ApprovalMode,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
            fsync: true,
            redact: true,
            tool_manifest_dir: None,
            max_tokens: None,
            max_cost_usd: None,
            max_duration_ms: None,
            max_iterations: None,
            max_steps: None,
            approval_mode: ApprovalMode::AutoDeny,
        }
    }
}

impl Default for ApprovalMode {
    fn default() -> Self {
        ApprovalMode::AutoDeny
    }
}

/// `$AK_STATE_DIR` > `$XDG_STATE_HOME/ak` > `~/.local/state/ak`, then
/// `journal.log` inside it. Mirrors the teacher's own state-dir resolution
/// order, one env var substituted for another.
fn default_journal_path() -> PathBuf {
    state_dir().join("journal.log")
}

fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AK_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("ak");
    }
    dirs::state_dir().unwrap_or_else(|| PathBuf::from(".")).join("ak")
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("AK_CONFIG_DIR") {
        return Some(PathBuf::from(dir).join("config.toml"));
    }
    dirs::config_dir().map(|dir| dir.join("ak").join("config.toml"))
}

/// Loads the config file at `explicit_path`, or the default location if
/// `explicit_path` is `None` and a file happens to exist there. Returns the
/// built-in default, untouched, if neither is present — a missing config
/// file is not an error.
pub fn load(explicit_path: Option<&Path>) -> anyhow::Result<KernelConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return Ok(KernelConfig::default());
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
    let config: KernelConfig = toml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
    Ok(config)
}
