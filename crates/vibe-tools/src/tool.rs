// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

impl ToolCall {
    /// Build a call from canonical argument text.  Empty text becomes an
    /// empty object; text that fails to parse is kept as a JSON string so
    /// the tool can report the malformed input itself.
    pub fn from_arguments(id: impl Into<String>, name: impl Into<String>, arguments: &str) -> Self {
        let args = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments)
                .unwrap_or_else(|_| Value::String(arguments.to_string()))
        };
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// The result of executing a tool.
///
/// Exactly one of `content` or `error` is meaningful: successful results
/// carry `content`, failed results carry `error` (and `content` mirrors it
/// so the conversation history always has text to show the model).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub error: Option<String>,
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            error: None,
            is_error: false,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let text = msg.into();
        Self {
            call_id: call_id.into(),
            content: text.clone(),
            error: Some(text),
            is_error: true,
        }
    }
}

/// Trait that every built-in and user-defined tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Errors should be wrapped in [`ToolOutput::err`];
    /// implementations must honor cancellation at their await points.
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// Lets a caller keep a typed handle to a tool (e.g. for write_file undo)
// while registering a shared reference in the registry.
#[async_trait]
impl<T: Tool + ?Sized> Tool for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn description(&self) -> &str {
        (**self).description()
    }
    fn parameters_schema(&self) -> Value {
        (**self).parameters_schema()
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        (**self).execute(call).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
