// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_MAX_MATCHES: usize = 500;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Pattern search built on ripgrep (falls back to grep).\n\
         pattern: full regex. file_pattern: glob filter ('*.rs', '*.{ts,tsx}').\n\
         mode: content (default, file:line:text) | files_with_matches | count.\n\
         context_lines: lines of context before+after each match (default 0).\n\
         max_matches: result cap (default 500).\n\
         Use files_with_matches for discovery, then read_file for details."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in (default: current directory)"
                },
                "mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output format (default content)"
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Lines of context before and after each match (default 0)"
                },
                "max_matches": {
                    "type": "integer",
                    "description": "Maximum number of result lines (default 500)"
                },
                "file_pattern": {
                    "type": "string",
                    "description": "Glob pattern to filter files, e.g. '*.rs' (default '*')"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => {
                let args_preview =
                    serde_json::to_string(&call.args).unwrap_or_else(|_| "null".to_string());
                return ToolOutput::err(
                    &call.id,
                    format!("missing required parameter 'pattern'. Received: {args_preview}"),
                );
            }
        };
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let mode = call
            .args
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("content")
            .to_string();
        let context_lines =
            call.args.get("context_lines").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let max_matches = call
            .args
            .get("max_matches")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_MATCHES as u64) as usize;
        let file_pattern = call
            .args
            .get("file_pattern")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty() && *p != "*")
            .map(str::to_string);

        debug!(pattern = %pattern, path = %path, mode = %mode, "grep tool");

        let result = run_search(
            &pattern,
            &path,
            &mode,
            context_lines,
            max_matches,
            file_pattern.as_deref(),
        )
        .await;

        match result {
            Ok(output) if output.trim().is_empty() => ToolOutput::ok(&call.id, "(no matches)"),
            Ok(output) => ToolOutput::ok(&call.id, output),
            Err(e) => ToolOutput::err(&call.id, format!("grep error: {e}")),
        }
    }
}

async fn run_search(
    pattern: &str,
    path: &str,
    mode: &str,
    context_lines: usize,
    max_matches: usize,
    file_pattern: Option<&str>,
) -> anyhow::Result<String> {
    let has_rg = tokio::process::Command::new("which")
        .arg("rg")
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);

    let output = if has_rg {
        let mut args = vec!["--color".to_string(), "never".to_string()];
        match mode {
            "files_with_matches" => args.push("-l".to_string()),
            "count" => args.push("-c".to_string()),
            _ => {
                args.push("-n".to_string());
                args.push("--no-heading".to_string());
            }
        }
        if context_lines > 0 && mode == "content" {
            args.push(format!("-C{context_lines}"));
        }
        if let Some(glob) = file_pattern {
            args.push("-g".to_string());
            args.push(glob.to_string());
        }
        args.push(pattern.to_string());
        args.push(path.to_string());

        tokio::process::Command::new("rg")
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await?
    } else {
        // Fallback to grep
        let mut args = vec!["-rn".to_string()];
        match mode {
            "files_with_matches" => args.push("-l".to_string()),
            "count" => args.push("-c".to_string()),
            _ => {}
        }
        if context_lines > 0 && mode == "content" {
            args.push(format!("-C{context_lines}"));
        }
        if let Some(glob) = file_pattern {
            args.push("--include".to_string());
            args.push(glob.to_string());
        }
        args.push(pattern.to_string());
        args.push(path.to_string());

        tokio::process::Command::new("grep")
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await?
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().take(max_matches).collect();
    let mut result = lines.join("\n");
    let total_lines = stdout.lines().count();
    if total_lines > max_matches {
        result.push_str(&format!(
            "\n...[{} more matches not shown — narrow with path or file_pattern]",
            total_lines - max_matches
        ));
    }
    Ok(result)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
