// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use vibe_model::ToolCall;

use crate::agent::RunStatus;

/// Events emitted by the agent during a run.
/// Consumers (CLI, future front-ends) subscribe to these to drive output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A new iteration of the agent loop began.
    IterationStarted { iteration: u32 },
    /// The model replied with text (final or before tool calls).
    AssistantText(String),
    /// The model requested a tool call.
    ToolCallStarted(ToolCall),
    /// A tool call finished.
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// The session was compacted; statistics for display.
    Compacted {
        tokens_before: usize,
        tokens_after: usize,
        removed_messages: usize,
    },
    /// The run reached a terminal state.
    RunFinished {
        status: RunStatus,
        explanation: String,
    },
}
