// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use similar::TextDiff;
use tracing::debug;

use crate::sandbox::{atomic_write, Sandbox};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Diff output is cut after this many lines.
const DIFF_LINE_LIMIT: usize = 40;

pub struct EditFileTool {
    sandbox: Arc<Sandbox>,
}

impl EditFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replaces old_string with new_string in a file. old_string must match \
         the file contents exactly, including whitespace. When old_string \
         occurs more than once the edit is rejected with the occurrence count \
         unless replace_all is set. Returns a unified diff of the change."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let old_string = match call.args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'old_string'"),
        };
        let new_string = match call.args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'new_string'"),
        };
        let replace_all = call
            .args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if old_string.is_empty() {
            return ToolOutput::err(&call.id, "old_string must not be empty");
        }
        if old_string == new_string {
            return ToolOutput::err(&call.id, "old_string and new_string are identical");
        }

        debug!(path = %path, replace_all, "edit_file tool");

        let original = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = original.matches(&old_string).count();
        if occurrences == 0 {
            return ToolOutput::err(
                &call.id,
                format!("old_string not found in {path}. Re-read the file and retry with exact text."),
            );
        }
        if occurrences > 1 && !replace_all {
            return ToolOutput::err(
                &call.id,
                format!(
                    "old_string occurs {occurrences} times in {path}; \
                     provide more context or set replace_all=true"
                ),
            );
        }

        let updated = if replace_all {
            original.replace(&old_string, &new_string)
        } else {
            original.replacen(&old_string, &new_string, 1)
        };

        let diff = render_diff(&path, &original, &updated);

        // Sandbox mode: divert the edited content to the shadow tree.
        if self.sandbox.is_enabled() {
            return match self.sandbox.stage(Path::new(&path), updated.as_bytes()) {
                Ok(entry) => ToolOutput::ok(
                    &call.id,
                    format!("[sandbox] Staged edit of {}\n{diff}", entry.relative_path),
                ),
                Err(e) => ToolOutput::err(&call.id, format!("sandbox stage error: {e}")),
            };
        }

        match atomic_write(Path::new(&path), updated.as_bytes()) {
            Ok(()) => ToolOutput::ok(
                &call.id,
                format!("edited {path} ({occurrences} replacement(s))\n{diff}"),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

/// Unified diff between `old` and `new`, truncated at 40 lines.
fn render_diff(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let full = diff
        .unified_diff()
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();
    let lines: Vec<&str> = full.lines().collect();
    if lines.len() <= DIFF_LINE_LIMIT {
        return full;
    }
    let mut out = lines[..DIFF_LINE_LIMIT].join("\n");
    out.push_str(&format!(
        "\n...[diff truncated: {} more lines]",
        lines.len() - DIFF_LINE_LIMIT
    ));
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
