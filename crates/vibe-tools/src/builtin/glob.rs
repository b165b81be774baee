// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Result cap; a notice is appended when more files matched.
const MAX_RESULTS: usize = 500;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", ".venv", "venv", "target"];

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Search for files matching a glob pattern recursively under a root \
         directory. Returns matching paths sorted by modification time \
         (newest first).\n\
         Pattern tips: '*.rs', 'Cargo.toml', 'src/**/*.ts' — a path prefix \
         like 'src/**/' is stripped automatically; the recursive walk covers it.\n\
         The pattern must be a single glob, not a comma-separated list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Filename glob pattern (e.g. '*.rs', '*.toml')"
                },
                "path": {
                    "type": "string",
                    "description": "Root directory to search from (default: current directory)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let raw_pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'pattern'"),
        };
        let root = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();

        let name_pattern = normalize_glob(&raw_pattern);
        let Some(re) = glob_to_regex(&name_pattern) else {
            return ToolOutput::err(&call.id, format!("invalid glob pattern: {raw_pattern}"));
        };

        debug!(pattern = %name_pattern, root = %root, "glob tool");

        let mut matches: Vec<(SystemTime, String)> = Vec::new();
        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if re.is_match(&name) {
                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((mtime, entry.path().to_string_lossy().into_owned()));
            }
        }

        // Newest first
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        let total = matches.len();
        let mut lines: Vec<String> = matches.into_iter().take(MAX_RESULTS).map(|(_, p)| p).collect();
        if total > MAX_RESULTS {
            lines.push(format!(
                "...[{} more matches not shown — narrow the pattern]",
                total - MAX_RESULTS
            ));
        }

        if lines.is_empty() {
            ToolOutput::ok(&call.id, "(no matches)")
        } else {
            ToolOutput::ok(&call.id, lines.join("\n"))
        }
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|n| SKIP_DIRS.contains(&n))
            .unwrap_or(false)
}

/// Strip any path prefix so the filename part alone is matched.  The
/// recursive walk already covers `**/`-style prefixes.
///
/// Examples:
///   `**/*.rs`            → `*.rs`
///   `src/**/*.ts`        → `*.ts`
///   `build/zephyr.elf`   → `zephyr.elf`
fn normalize_glob(pattern: &str) -> String {
    match pattern.rfind('/') {
        Some(pos) => pattern[pos + 1..].to_string(),
        None => pattern.to_string(),
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "g1".into(),
            name: "glob".into(),
            args,
        }
    }

    // ── Pattern handling ──────────────────────────────────────────────────────

    #[test]
    fn normalize_strips_double_star_prefix() {
        assert_eq!(normalize_glob("**/*.rs"), "*.rs");
    }

    #[test]
    fn normalize_strips_path_prefix() {
        assert_eq!(normalize_glob("src/**/*.ts"), "*.ts");
    }

    #[test]
    fn normalize_keeps_plain_name() {
        assert_eq!(normalize_glob("*.toml"), "*.toml");
    }

    #[test]
    fn glob_regex_matches_star() {
        let re = glob_to_regex("*.rs").unwrap();
        assert!(re.is_match("main.rs"));
        assert!(!re.is_match("main.rb"));
    }

    #[test]
    fn glob_regex_question_mark_matches_one_char() {
        let re = glob_to_regex("a?.txt").unwrap();
        assert!(re.is_match("ab.txt"));
        assert!(!re.is_match("abc.txt"));
    }

    #[test]
    fn glob_regex_escapes_dots() {
        let re = glob_to_regex("a.rs").unwrap();
        assert!(!re.is_match("axrs"), "dot must be literal");
    }

    // ── Search execution ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn finds_files_in_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested/deeper");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("main.rs"), "").unwrap();

        let out = GlobTool
            .execute(&call(json!({"pattern": "*.rs", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("main.rs"));
        assert!(out.content.contains("lib.rs"));
    }

    #[tokio::test]
    async fn newest_file_is_listed_first() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.txt");
        let new = dir.path().join("new.txt");
        std::fs::write(&old, "").unwrap();
        // Push the second file's mtime clearly past the first.
        std::fs::write(&new, "").unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let f = std::fs::File::options().write(true).open(&new).unwrap();
        f.set_modified(later).unwrap();

        let out = GlobTool
            .execute(&call(json!({"pattern": "*.txt", "path": dir.path().to_str().unwrap()})))
            .await;
        let first = out.content.lines().next().unwrap();
        assert!(first.contains("new.txt"), "newest first: {}", out.content);
    }

    #[tokio::test]
    async fn skips_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join("node_modules/pkg");
        std::fs::create_dir_all(&hidden).unwrap();
        std::fs::write(hidden.join("index.js"), "").unwrap();
        std::fs::write(dir.path().join("app.js"), "").unwrap();

        let out = GlobTool
            .execute(&call(json!({"pattern": "*.js", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(out.content.contains("app.js"));
        assert!(!out.content.contains("node_modules"));
    }

    #[tokio::test]
    async fn no_match_returns_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let out = GlobTool
            .execute(&call(json!({"pattern": "*.zig", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("no matches"));
    }

    #[tokio::test]
    async fn missing_pattern_is_error() {
        let out = GlobTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'pattern'"));
    }
}
