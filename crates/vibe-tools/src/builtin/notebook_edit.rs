// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::sandbox::atomic_write;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct NotebookEditTool;

#[async_trait]
impl Tool for NotebookEditTool {
    fn name(&self) -> &str {
        "notebook_edit"
    }

    fn description(&self) -> &str {
        "Edit a Jupyter notebook (.ipynb) cell.\n\
         edit_mode: replace (default) rewrites the cell source, insert adds a \
         new cell at cell_number, delete removes the cell.\n\
         cell_number is 0-indexed. cell_type (code|markdown) applies to \
         inserted cells (default code)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the .ipynb file"
                },
                "cell_number": {
                    "type": "integer",
                    "description": "0-indexed cell position"
                },
                "edit_mode": {
                    "type": "string",
                    "enum": ["replace", "insert", "delete"],
                    "description": "The edit to perform (default replace)"
                },
                "new_source": {
                    "type": "string",
                    "description": "New cell source (required for replace and insert)"
                },
                "cell_type": {
                    "type": "string",
                    "enum": ["code", "markdown"],
                    "description": "Cell type for inserted cells (default code)"
                }
            },
            "required": ["path", "cell_number"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let cell_number = match call.args.get("cell_number").and_then(|v| v.as_u64()) {
            Some(n) => n as usize,
            None => return ToolOutput::err(&call.id, "missing required parameter 'cell_number'"),
        };
        let edit_mode = call
            .args
            .get("edit_mode")
            .and_then(|v| v.as_str())
            .unwrap_or("replace")
            .to_string();
        let new_source = call
            .args
            .get("new_source")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let cell_type = call
            .args
            .get("cell_type")
            .and_then(|v| v.as_str())
            .unwrap_or("code")
            .to_string();

        debug!(path = %path, cell_number, mode = %edit_mode, "notebook_edit tool");

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let mut notebook: Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid notebook JSON: {e}")),
        };
        let Some(cells) = notebook.get_mut("cells").and_then(|c| c.as_array_mut()) else {
            return ToolOutput::err(&call.id, "notebook has no 'cells' array");
        };

        let summary = match edit_mode.as_str() {
            "replace" => {
                let Some(source) = new_source else {
                    return ToolOutput::err(&call.id, "replace requires 'new_source'");
                };
                let Some(cell) = cells.get_mut(cell_number) else {
                    return ToolOutput::err(
                        &call.id,
                        format!("cell {cell_number} out of range ({} cells)", cells.len()),
                    );
                };
                cell["source"] = source_lines(&source);
                format!("replaced cell {cell_number} in {path}")
            }
            "insert" => {
                let Some(source) = new_source else {
                    return ToolOutput::err(&call.id, "insert requires 'new_source'");
                };
                if cell_number > cells.len() {
                    return ToolOutput::err(
                        &call.id,
                        format!("cell {cell_number} out of range ({} cells)", cells.len()),
                    );
                }
                cells.insert(cell_number, new_cell(&cell_type, &source));
                format!("inserted {cell_type} cell at {cell_number} in {path}")
            }
            "delete" => {
                if cell_number >= cells.len() {
                    return ToolOutput::err(
                        &call.id,
                        format!("cell {cell_number} out of range ({} cells)", cells.len()),
                    );
                }
                cells.remove(cell_number);
                format!("deleted cell {cell_number} from {path}")
            }
            other => return ToolOutput::err(&call.id, format!("unknown edit_mode: {other}")),
        };

        let serialized = match serde_json::to_string_pretty(&notebook) {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("serialize error: {e}")),
        };
        match atomic_write(Path::new(&path), serialized.as_bytes()) {
            Ok(()) => ToolOutput::ok(&call.id, summary),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

/// Jupyter stores cell source as a list of lines, each keeping its trailing
/// newline except the last.
fn source_lines(source: &str) -> Value {
    let mut lines: Vec<String> = source
        .split_inclusive('\n')
        .map(|l| l.to_string())
        .collect();
    if lines.is_empty() {
        lines.push(String::new());
    }
    Value::Array(lines.into_iter().map(Value::String).collect())
}

fn new_cell(cell_type: &str, source: &str) -> Value {
    let mut cell = json!({
        "cell_type": cell_type,
        "metadata": {},
        "source": source_lines(source),
    });
    if cell_type == "code" {
        cell["execution_count"] = Value::Null;
        cell["outputs"] = json!([]);
    }
    cell
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "n1".into(),
            name: "notebook_edit".into(),
            args,
        }
    }

    fn notebook(dir: &tempfile::TempDir) -> String {
        let nb = json!({
            "cells": [
                {"cell_type": "code", "metadata": {}, "execution_count": null,
                 "outputs": [], "source": ["print(1)\n", "print(2)"]},
                {"cell_type": "markdown", "metadata": {}, "source": ["# Title"]}
            ],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 5
        });
        let path = dir.path().join("nb.ipynb");
        std::fs::write(&path, serde_json::to_string(&nb).unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn load(path: &str) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    // ── Replace ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn replace_rewrites_cell_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({
                "path": path, "cell_number": 0, "edit_mode": "replace",
                "new_source": "x = 42\nprint(x)"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let nb = load(&path);
        assert_eq!(nb["cells"][0]["source"][0], "x = 42\n");
        assert_eq!(nb["cells"][0]["source"][1], "print(x)");
    }

    #[tokio::test]
    async fn replace_out_of_range_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({
                "path": path, "cell_number": 9, "edit_mode": "replace", "new_source": "x"
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("out of range"));
    }

    #[tokio::test]
    async fn replace_without_source_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({"path": path, "cell_number": 0})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("new_source"));
    }

    // ── Insert ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_adds_code_cell_with_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({
                "path": path, "cell_number": 1, "edit_mode": "insert",
                "new_source": "y = 7"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let nb = load(&path);
        assert_eq!(nb["cells"].as_array().unwrap().len(), 3);
        assert_eq!(nb["cells"][1]["cell_type"], "code");
        assert!(nb["cells"][1]["outputs"].is_array());
    }

    #[tokio::test]
    async fn insert_markdown_cell_has_no_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        NotebookEditTool
            .execute(&call(json!({
                "path": path, "cell_number": 0, "edit_mode": "insert",
                "new_source": "# Header", "cell_type": "markdown"
            })))
            .await;
        let nb = load(&path);
        assert_eq!(nb["cells"][0]["cell_type"], "markdown");
        assert!(nb["cells"][0].get("outputs").is_none());
    }

    #[tokio::test]
    async fn insert_at_end_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({
                "path": path, "cell_number": 2, "edit_mode": "insert", "new_source": "tail"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let nb = load(&path);
        assert_eq!(nb["cells"].as_array().unwrap().len(), 3);
    }

    // ── Delete ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn delete_removes_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({"path": path, "cell_number": 0, "edit_mode": "delete"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let nb = load(&path);
        assert_eq!(nb["cells"].as_array().unwrap().len(), 1);
        assert_eq!(nb["cells"][0]["cell_type"], "markdown");
    }

    #[tokio::test]
    async fn delete_out_of_range_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = notebook(&dir);
        let out = NotebookEditTool
            .execute(&call(json!({"path": path, "cell_number": 5, "edit_mode": "delete"})))
            .await;
        assert!(out.is_error);
    }

    // ── Misc ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ipynb");
        std::fs::write(&path, "{oops").unwrap();
        let out = NotebookEditTool
            .execute(&call(json!({
                "path": path.to_str().unwrap(), "cell_number": 0, "edit_mode": "delete"
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid notebook JSON"));
    }

    #[test]
    fn source_lines_keep_trailing_newlines() {
        let v = source_lines("a\nb\nc");
        assert_eq!(v[0], "a\n");
        assert_eq!(v[1], "b\n");
        assert_eq!(v[2], "c");
    }
}
