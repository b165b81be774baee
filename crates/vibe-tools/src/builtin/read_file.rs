// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Default number of lines returned when the caller does not specify a limit.
const DEFAULT_LINE_LIMIT: usize = 2000;

/// Hard ceiling on readable file size.
const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Bytes sampled from the start of a file for binary detection.
const BINARY_SNIFF_BYTES: usize = 512;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a text file. Default: 2000 lines starting at offset 0.\n\
         Binary files (NUL byte in the first 512 bytes) are reported, not dumped.\n\
         Images (png/jpg/jpeg/gif/webp/bmp) are returned as base64.\n\
         Jupyter notebooks (.ipynb) are reformatted as pretty-printed JSON.\n\
         When more lines exist, a truncation notice shows the next offset.\n\
         Strategy: use grep to find the relevant region first, then read only\n\
         those lines with offset+limit instead of whole large files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "0-indexed line number to start reading from (default 0)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
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
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path = %path, offset, limit, "read_file tool");

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > MAX_FILE_BYTES => {
                return ToolOutput::err(
                    &call.id,
                    format!(
                        "file too large: {} bytes (limit {} bytes)",
                        meta.len(),
                        MAX_FILE_BYTES
                    ),
                );
            }
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
            _ => {}
        }

        let ext = std::path::Path::new(&path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        // Images go back as base64 so the caller can decode or forward them.
        if is_image_extension(&ext) {
            let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
            return ToolOutput::ok(
                &call.id,
                format!("image file {path} ({} bytes), base64:\n{b64}", bytes.len()),
            );
        }

        // Notebooks are JSON; reformat so cell structure is readable.
        if ext == "ipynb" {
            return match serde_json::from_slice::<Value>(&bytes) {
                Ok(v) => ToolOutput::ok(
                    &call.id,
                    serde_json::to_string_pretty(&v).unwrap_or_default(),
                ),
                Err(e) => ToolOutput::err(&call.id, format!("invalid notebook JSON: {e}")),
            };
        }

        if is_binary(&bytes) {
            return ToolOutput::ok(
                &call.id,
                format!("binary file {path} ({} bytes); not shown", bytes.len()),
            );
        }

        let text = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = text.lines().collect();
        let total = all_lines.len();
        let slice: Vec<&str> = all_lines.iter().skip(offset).take(limit).copied().collect();
        let shown = slice.len();
        let mut content = slice.join("\n");

        if offset + shown < total {
            content.push_str(&format!(
                "\n...[{} more lines; use offset={} to continue]",
                total - offset - shown,
                offset + shown
            ));
        }
        ToolOutput::ok(&call.id, content)
    }
}

fn is_image_extension(ext: &str) -> bool {
    matches!(ext, "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp")
}

/// NUL-byte scan over the first 512 bytes, the same heuristic git uses.
pub(crate) fn is_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    sample.contains(&0u8)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
