// SPDX-License-Identifier: MIT

//! Loads tool manifests from a directory of `*.json` files into a
//! [`ToolManifestMap`], always including the in-tree `shell` example
//! handler's own manifest so a config with no manifest directory configured
//! still has something runnable to plan against.

use ak_core::{RunnerCategory, SupportedModes, ToolManifest, ToolManifestMap};
use serde_json::json;
use std::path::Path;

/// The manifest for the in-tree `shell` example handler (see
/// [`crate`]'s wiring of [`ak_tools::ShellHandler`]).
pub fn shell_manifest() -> ToolManifest {
    ToolManifest {
        name: "shell".to_string(),
        version: "1.0.0".to_string(),
        description: "runs a command line through sh -c".to_string(),
        runner: RunnerCategory::Shell,
        input_schema: json!({
            "type": "object",
            "required": ["command"],
            "properties": { "command": { "type": "string" } },
        }),
        output_schema: json!({
            "type": "object",
            "required": ["exit_code", "stdout", "stderr"],
        }),
        permissions: vec!["shell:exec:*".to_string()],
        timeout_ms: 30_000,
        supports: SupportedModes { mock: true, dry_run: true },
        mock_responses: vec![json!({"exit_code": 0, "stdout": "", "stderr": ""})],
    }
}

/// Builds the manifest map for a run: the built-in `shell` manifest, plus
/// every `*.json` file in `dir` (if given), each expected to deserialize as
/// one [`ToolManifest`] and pass [`ToolManifest::validate`].
pub fn load(dir: Option<&Path>) -> anyhow::Result<ToolManifestMap> {
    let mut manifests = ToolManifestMap::new();
    manifests.insert(shell_manifest())?;

    let Some(dir) = dir else {
        return Ok(manifests);
    };

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("reading tool manifest dir {}: {e}", dir.display()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    for path in entries {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading manifest {}: {e}", path.display()))?;
        let manifest: ToolManifest = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing manifest {}: {e}", path.display()))?;
        manifest
            .validate()
            .map_err(|e| anyhow::anyhow!("manifest {} failed validation: {e}", path.display()))?;
        manifests
            .insert(manifest)
            .map_err(|e| anyhow::anyhow!("manifest {} rejected: {e}", path.display()))?;
    }

    Ok(manifests)
}
