// SPDX-License-Identifier: MIT

//! Policy enforcement: path, command, and endpoint allowlists plus SSRF
//! protection, applied by handlers immediately before I/O.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Filename/suffix patterns that are always denied for read/write, no
/// matter what `allowed_paths` says.
const SENSITIVE_NAMES: &[&str] = &[".env", ".aws/credentials", ".gnupg"];
const SENSITIVE_DIR_COMPONENTS: &[&str] = &[".ssh", ".gnupg"];
const SENSITIVE_PREFIXES: &[&str] = &["id_rsa", "id_ed25519", "id_ecdsa"];

/// The policy profile the runtime threads through to a handler for a single
/// tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
    #[serde(default)]
    pub writable_paths: Vec<PathBuf>,
    #[serde(default)]
    pub readonly_paths: Vec<PathBuf>,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    #[serde(default)]
    pub allowed_endpoints: Vec<String>,
}

impl Policy {
    /// Checks a path for read access: inside `allowed_paths` and not a
    /// sensitive file, after resolving symlinks on both sides.
    pub fn check_read_path(&self, path: &Path) -> Result<(), ToolError> {
        self.check_sensitive(path)?;
        self.check_within_allowed(path)
    }

    /// Checks a path for write access: read rules, plus the writable/
    /// readonly overlay.
    pub fn check_write_path(&self, path: &Path) -> Result<(), ToolError> {
        self.check_sensitive(path)?;
        self.check_within_allowed(path)?;
        if self.is_under_any(path, &self.readonly_paths) {
            return Err(ToolError::PolicyPathDenied(path.display().to_string()));
        }
        if !self.writable_paths.is_empty() && !self.is_under_any(path, &self.writable_paths) {
            return Err(ToolError::PolicyPathDenied(path.display().to_string()));
        }
        Ok(())
    }

    fn check_sensitive(&self, path: &Path) -> Result<(), ToolError> {
        if is_sensitive_path(path) {
            return Err(ToolError::SensitiveFileDenied(path.display().to_string()));
        }
        Ok(())
    }

    fn check_within_allowed(&self, path: &Path) -> Result<(), ToolError> {
        if self.is_under_any(path, &self.allowed_paths) {
            Ok(())
        } else {
            Err(ToolError::PolicyPathDenied(path.display().to_string()))
        }
    }

    fn is_under_any(&self, path: &Path, roots: &[PathBuf]) -> bool {
        let resolved = canonicalize_best_effort(path);
        roots.iter().any(|root| {
            let root = canonicalize_best_effort(root);
            resolved.starts_with(&root)
        })
    }

    /// Checks a shell command line's resolved binary basename against
    /// `allowed_commands`. Recognises single- and double-quoted leading
    /// arguments.
    pub fn check_command(&self, command_line: &str) -> Result<(), ToolError> {
        let Some(program) = first_token(command_line) else {
            return Err(ToolError::PolicyCommandDenied(command_line.to_string()));
        };
        let basename = Path::new(&program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&program)
            .to_string();
        if self.allowed_commands.iter().any(|c| c == &basename) {
            Ok(())
        } else {
            Err(ToolError::PolicyCommandDenied(basename))
        }
    }

    /// Checks an outbound HTTP(S) URL against `allowed_endpoints`, resolves
    /// DNS, and rejects any resolved address in a private/loopback/
    /// link-local/multicast/reserved range. Call again for every redirect
    /// hop; this function does not follow redirects itself.
    pub fn check_endpoint(&self, url: &str) -> Result<(), ToolError> {
        let parsed = url::Url::parse(url).map_err(|_| ToolError::PolicyEndpointDenied(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ToolError::PolicyEndpointDenied(url.to_string()));
        }
        let host = parsed.host_str().ok_or_else(|| ToolError::PolicyEndpointDenied(url.to_string()))?;
        if !self.allowed_endpoints.iter().any(|e| e == host) {
            return Err(ToolError::PolicyEndpointDenied(url.to_string()));
        }

        let port = parsed.port_or_known_default().unwrap_or(443);
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| ToolError::PolicyEndpointDenied(format!("{host}: {e}")))?;
        for addr in addrs {
            check_ssrf_safe(addr)?;
        }
        Ok(())
    }
}

fn is_sensitive_path(path: &Path) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if SENSITIVE_NAMES.iter().any(|n| path.to_string_lossy().ends_with(n)) {
        return true;
    }
    if SENSITIVE_PREFIXES.iter().any(|p| file_name.starts_with(p)) {
        return true;
    }
    path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        SENSITIVE_DIR_COMPONENTS.contains(&s.as_ref())
    })
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn first_token(command_line: &str) -> Option<String> {
    let trimmed = command_line.trim_start();
    let mut chars = trimmed.chars().peekable();
    match chars.peek() {
        Some('"') => {
            chars.next();
            let token: String = chars.by_ref().take_while(|&c| c != '"').collect();
            Some(token)
        }
        Some('\'') => {
            chars.next();
            let token: String = chars.by_ref().take_while(|&c| c != '\'').collect();
            Some(token)
        }
        Some(_) => trimmed.split_whitespace().next().map(str::to_string),
        None => None,
    }
}

fn check_ssrf_safe(addr: SocketAddr) -> Result<(), ToolError> {
    let ip = addr.ip();
    if is_disallowed_ip(ip) {
        return Err(ToolError::Ssrf(ip.to_string()));
    }
    Ok(())
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_multicast() || v6.is_unspecified() || is_unique_local_v6(v6)
        }
    }
}

fn is_unique_local_v6(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
