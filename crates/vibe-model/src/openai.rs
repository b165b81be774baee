// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    normalize_arguments, CompletionRequest, CompletionResponse, Message, ModelProvider, Role,
    ToolCall,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Driver for the OpenAI-compatible chat completion wire format.
///
/// Works against any endpoint implementing `/chat/completions` — hosted
/// OpenAI, local proxies, Ollama, LiteLLM.  Responses are parsed
/// non-streaming; tool-call arguments are normalized before they leave this
/// module.
pub struct OpenAiProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        temperature: Option<f32>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            temperature,
            client,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let body = build_request_body(&self.model, req, self.temperature);
        debug!(model = %self.model, messages = req.messages.len(), "openai completion request");

        let mut http = self.client.post(self.chat_url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.context("sending completion request")?;
        let status = response.status();
        let text = response.text().await.context("reading completion body")?;
        if !status.is_success() {
            bail!("openai error {status}: {}", snippet(&text, 500));
        }

        let wire: WireResponse =
            serde_json::from_str(&text).context("decoding completion response")?;
        parse_response(wire)
    }
}

fn snippet(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ─── Wire format ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolSchema<'a>,
}

#[derive(Serialize)]
struct WireToolSchema<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn build_request_body<'a>(
    model: &'a str,
    req: &'a CompletionRequest,
    default_temperature: Option<f32>,
) -> WireRequest<'a> {
    let messages = req.messages.iter().map(wire_message).collect();
    let tools = req
        .tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireToolSchema {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect();
    WireRequest {
        model,
        messages,
        tools,
        stream: req.stream,
        temperature: req.temperature.or(default_temperature),
        max_tokens: req.max_tokens,
    }
}

fn wire_message(msg: &Message) -> WireMessage {
    WireMessage {
        role: role_str(msg.role),
        content: msg.content.clone(),
        tool_call_id: msg.tool_call_id.clone(),
        tool_calls: msg
            .tool_calls
            .iter()
            .map(|tc| WireToolCall {
                id: tc.id.clone(),
                kind: "function".into(),
                function: WireFunction {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            })
            .collect(),
    }
}

/// Map the wire response into a [`CompletionResponse`], normalizing every
/// tool call's argument text.
///
/// Tool calls with an empty name cannot be dispatched and are dropped —
/// storing them would corrupt the conversation history sent back to the API
/// on the next turn.  An empty id gets a synthetic fallback so the turn can
/// still complete.
fn parse_response(wire: WireResponse) -> anyhow::Result<CompletionResponse> {
    let Some(choice) = wire.choices.into_iter().next() else {
        bail!("completion response contained no choices");
    };

    let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
    for (i, tc) in choice.message.tool_calls.into_iter().enumerate() {
        if tc.function.name.is_empty() {
            warn!(tool_call_id = %tc.id, "dropping tool call with empty name from model");
            continue;
        }
        let id = if tc.id.is_empty() {
            warn!(tool_name = %tc.function.name, "tool call had empty id; generating synthetic id");
            format!("tc_synthetic_{i}")
        } else {
            tc.id
        };
        tool_calls.push(ToolCall {
            id,
            name: tc.function.name,
            arguments: normalize_arguments(&tc.function.arguments),
        });
    }

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason: choice.finish_reason,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
