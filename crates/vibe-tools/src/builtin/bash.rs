// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(unix)]
use libc;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tasks;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Combined stdout + stderr cap: a 15 000-char prefix and suffix are kept
/// with an omission marker between them.
const OUTPUT_LIMIT_CHARS: usize = 30_000;
const KEEP_PREFIX_CHARS: usize = 15_000;
const KEEP_SUFFIX_CHARS: usize = 15_000;

/// Environment variable names containing any of these substrings are
/// stripped from the child's environment.
const SENSITIVE_ENV_MARKERS: &[&str] = &[
    "TOKEN", "SECRET", "PASSWORD", "KEY", "AUTH", "PRIVATE", "API_KEY",
];

pub struct BashTool {
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self {
            default_timeout_secs: 120,
            max_timeout_secs: 600,
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         Output is capped at 30,000 characters; when larger, a 15,000-char \
         prefix and suffix are kept with an omission marker between them.\n\
         Default timeout 120s, maximum 600s. Set run_in_background=true for \
         long-running commands; the task id is returned immediately.\n\
         Prefer non-interactive commands; avoid anything that needs a TTY.\n\
         Do NOT use bash for file operations: read files with read_file, \
         search with grep, find files with glob, edit with edit_file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (default 120, max 600)"
                },
                "run_in_background": {
                    "type": "boolean",
                    "description": "Run detached and return a task id (default false)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'command'"),
        };
        let timeout = call
            .args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_secs)
            .min(self.max_timeout_secs);
        let background = call
            .args
            .get("run_in_background")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if let Some(pattern) = match_dangerous(&command) {
            return ToolOutput::err(
                &call.id,
                format!("refusing dangerous command (matched `{pattern}`): {command}"),
            );
        }

        debug!(cmd = %command, timeout, background, "bash tool");

        if background {
            return match tasks::global().spawn(&command, Duration::from_secs(timeout)) {
                Ok(id) => ToolOutput::ok(&call.id, format!("started background task {id}")),
                Err(e) => ToolOutput::err(&call.id, e.to_string()),
            };
        }

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        // Strip credential-bearing environment variables from the child.
        cmd.env_clear();
        for (k, v) in std::env::vars() {
            if !is_sensitive_env(&k) {
                cmd.env(k, v);
            }
        }
        // Isolate the subprocess from the controlling terminal.
        //
        // `stdin(Stdio::null())` stops child programs from reading fd 0;
        // `kill_on_drop(true)` delivers SIGKILL when the timeout future is
        // dropped; setsid() detaches the child so open("/dev/tty") fails
        // with ENXIO instead of reaching the user's terminal.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let result = tokio::time::timeout(Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stdout.is_empty() {
                    content.push_str(&stdout);
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&stderr);
                }
                let content = truncate_middle(&content);
                let code = output.status.code().unwrap_or(-1);
                if code == 0 {
                    if content.is_empty() {
                        ToolOutput::ok(&call.id, "[exit 0]")
                    } else {
                        ToolOutput::ok(&call.id, content)
                    }
                } else {
                    ToolOutput::err(&call.id, format!("[exit {code}]\n{content}"))
                }
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("timeout after {timeout}s")),
        }
    }
}

fn is_sensitive_env(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    SENSITIVE_ENV_MARKERS.iter().any(|m| upper.contains(m))
}

/// Regex set for commands that are never run, regardless of approval.
fn dangerous_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\brm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)[a-z]*\s+/\s*$",
            r"(?i)\brm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)[a-z]*\s+/\s",
            r"(?i)\bmkfs(\.\w+)?\b",
            r"(?i)\bdd\s+.*of=/dev/(sd|hd|nvme|vd)",
            r":\(\)\s*\{.*\}\s*;\s*:",
            r"(?i)\b(shutdown|reboot|halt|poweroff)\b",
            r">\s*/dev/(sd|hd|nvme|vd)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn match_dangerous(command: &str) -> Option<String> {
    dangerous_patterns()
        .iter()
        .find(|re| re.is_match(command))
        .map(|re| re.as_str().to_string())
}

/// Cap output at 30,000 chars, keeping a 15,000-char prefix and suffix with
/// an omission marker in the middle so errors at the end are never lost.
pub(crate) fn truncate_middle(s: &str) -> String {
    let total = s.chars().count();
    if total <= OUTPUT_LIMIT_CHARS {
        return s.to_string();
    }
    let prefix: String = s.chars().take(KEEP_PREFIX_CHARS).collect();
    let suffix: String = {
        let skip = total - KEEP_SUFFIX_CHARS;
        s.chars().skip(skip).collect()
    };
    let omitted = total - KEEP_PREFIX_CHARS - KEEP_SUFFIX_CHARS;
    format!("{prefix}\n[{omitted} characters omitted]\n{suffix}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
