// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    normalize_arguments, CompletionRequest, CompletionResponse, ModelProvider, Role, ToolCall,
};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(CompletionResponse {
            content: format!("MOCK: {reply}"),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".into()),
        })
    }
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response from the front of the queue.  This lets tests specify exact
/// response sequences — including tool calls — without network access.
pub struct ScriptedProvider {
    scripts: Mutex<Vec<CompletionResponse>>,
    /// The last `CompletionRequest` seen by this provider.
    /// Written on each `complete()` call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// Number of `complete()` calls made so far.
    pub calls: Arc<Mutex<u32>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<CompletionResponse>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            last_request: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse {
            content: reply.into(),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".into()),
        }])
    }

    /// Convenience: a text-only response value.
    pub fn text(reply: impl Into<String>) -> CompletionResponse {
        CompletionResponse {
            content: reply.into(),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".into()),
        }
    }

    /// Convenience: a response consisting of the given tool calls.
    /// Arguments run through the same normalization as real providers.
    pub fn calling(calls: &[(&str, &str, &str)]) -> CompletionResponse {
        CompletionResponse {
            content: String::new(),
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: (*id).into(),
                    name: (*name).into(),
                    arguments: normalize_arguments(args),
                })
                .collect(),
            finish_reason: Some("tool_calls".into()),
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        *self.last_request.lock().unwrap() = Some(req.clone());
        *self.calls.lock().unwrap() += 1;
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            return Ok(CompletionResponse {
                content: "[no more scripts]".into(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".into()),
            });
        }
        Ok(scripts.remove(0))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
