// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::sandbox::{atomic_write, Sandbox};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Hard ceiling on written content.
const MAX_WRITE_BYTES: usize = 10 * 1024 * 1024;

/// Number of prior-content snapshots kept for undo.
const UNDO_STACK_LIMIT: usize = 20;

/// Paths that must never be written, regardless of permissions.
const PROTECTED_PATHS: &[&str] = &[
    "/",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/etc/passwd",
    "/etc/shadow",
];

/// Directory names managed by package/tool ecosystems; writes inside them are
/// refused so the agent cannot corrupt installed environments.
const MANAGED_DIRS: &[&str] = &[
    ".venv",
    "venv",
    "__pycache__",
    "node_modules",
    ".git",
    ".tox",
    "site-packages",
    "dist-packages",
];

struct UndoEntry {
    path: PathBuf,
    /// Prior content; `None` means the file did not exist before the write.
    prior: Option<Vec<u8>>,
}

pub struct WriteFileTool {
    sandbox: Arc<Sandbox>,
    undo_stack: Mutex<Vec<UndoEntry>>,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            undo_stack: Mutex::new(Vec::new()),
        }
    }

    /// Restore the most recent prior content (or delete the file if it was
    /// newly created).  Returns a description of what was undone.
    pub fn undo(&self) -> Option<String> {
        let entry = self.undo_stack.lock().expect("undo lock poisoned").pop()?;
        match entry.prior {
            Some(bytes) => {
                let _ = atomic_write(&entry.path, &bytes);
                Some(format!("restored {}", entry.path.display()))
            }
            None => {
                let _ = std::fs::remove_file(&entry.path);
                Some(format!("deleted {}", entry.path.display()))
            }
        }
    }

    fn push_undo(&self, path: &Path, prior: Option<Vec<u8>>) {
        let mut stack = self.undo_stack.lock().expect("undo lock poisoned");
        if stack.len() >= UNDO_STACK_LIMIT {
            stack.remove(0);
        }
        stack.push(UndoEntry {
            path: path.to_path_buf(),
            prior,
        });
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes a file to the local filesystem, overwriting any existing file \
         at the path. ALWAYS prefer editing existing files with edit_file. \
         NEVER proactively create documentation or README files unless \
         explicitly requested. Creates parent directories automatically. \
         Refuses system paths and package-managed directories."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => {
                let args_preview =
                    serde_json::to_string(&call.args).unwrap_or_else(|_| "null".to_string());
                return ToolOutput::err(
                    &call.id,
                    format!("missing required parameter 'path'. Received: {args_preview}"),
                );
            }
        };
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => {
                let args_preview =
                    serde_json::to_string(&call.args).unwrap_or_else(|_| "null".to_string());
                return ToolOutput::err(
                    &call.id,
                    format!("missing required parameter 'content'. Received: {args_preview}"),
                );
            }
        };

        if let Some(reason) = refuse_path(Path::new(&path)) {
            return ToolOutput::err(&call.id, reason);
        }
        if content.len() > MAX_WRITE_BYTES {
            return ToolOutput::err(
                &call.id,
                format!(
                    "content too large: {} bytes (limit {} bytes)",
                    content.len(),
                    MAX_WRITE_BYTES
                ),
            );
        }

        let content = decode_doubled_escapes(&content);
        debug!(path = %path, bytes = content.len(), "write_file tool");

        // Sandbox mode: divert the write to the shadow tree for review.
        if self.sandbox.is_enabled() {
            return match self.sandbox.stage(Path::new(&path), content.as_bytes()) {
                Ok(entry) => ToolOutput::ok(
                    &call.id,
                    format!(
                        "[sandbox] Staged write to {} ({} bytes)",
                        entry.relative_path,
                        content.len()
                    ),
                ),
                Err(e) => ToolOutput::err(&call.id, format!("sandbox stage error: {e}")),
            };
        }

        let target = Path::new(&path);
        let prior = std::fs::read(target).ok();
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolOutput::err(&call.id, format!("mkdir error: {e}"));
                }
            }
        }
        match atomic_write(target, content.as_bytes()) {
            Ok(()) => {
                self.push_undo(target, prior);
                ToolOutput::ok(&call.id, format!("wrote {} bytes to {path}", content.len()))
            }
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

/// Decode doubled backslash escapes (`\\n`, `\\t`, `\\r`) into real control
/// bytes.  Single escapes are left alone so regex and string literals inside
/// code survive untouched.
fn decode_doubled_escapes(content: &str) -> String {
    content
        .replace("\\\\n", "\n")
        .replace("\\\\t", "\t")
        .replace("\\\\r", "\r")
}

/// Returns a refusal message for protected or managed paths.
fn refuse_path(path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    if PROTECTED_PATHS.iter().any(|p| *p == text) {
        return Some(format!("refusing to write protected path: {text}"));
    }
    for comp in path.components() {
        if let Component::Normal(name) = comp {
            let name = name.to_string_lossy();
            if MANAGED_DIRS.iter().any(|d| *d == name) {
                return Some(format!(
                    "refusing to write inside managed directory '{name}': {text}"
                ));
            }
        }
    }
    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
