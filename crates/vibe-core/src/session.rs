// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use vibe_model::{Message, Role, ToolCall};
use vibe_tools::ToolOutput;

/// Messages preserved verbatim during compaction.
pub const COMPACTION_KEEP_RECENT: usize = 30;

/// Message count at which compaction triggers regardless of tokens.
pub const COMPACTION_MAX_MESSAGES: usize = 100;

/// Number of evicted messages previewed in the compaction summary.
const SUMMARY_PREVIEW_COUNT: usize = 5;

/// Preview length per evicted message.
const SUMMARY_PREVIEW_CHARS: usize = 100;

/// Statistics returned by [`Session::compact`].
#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub original_tokens: usize,
    pub new_tokens: usize,
    pub removed_count: usize,
    pub remaining_count: usize,
    pub summary: String,
}

/// Produces the replacement text for evicted history during compaction.
///
/// The default is the deterministic tally below; an LLM-backed summarizer
/// can be plugged in without touching the session.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, evicted: &[Message]) -> String;
}

/// Deterministic summarizer: role tallies, per-tool call counts, and short
/// previews of the most recently evicted messages.
pub struct TallySummarizer;

impl Summarizer for TallySummarizer {
    fn summarize(&self, evicted: &[Message]) -> String {
        let user_count = evicted.iter().filter(|m| m.role == Role::User).count();
        let assistant_count = evicted.iter().filter(|m| m.role == Role::Assistant).count();

        let mut tool_counts: Vec<(String, usize)> = {
            let mut map = std::collections::HashMap::new();
            for m in evicted {
                for tc in &m.tool_calls {
                    *map.entry(tc.name.clone()).or_insert(0usize) += 1;
                }
            }
            map.into_iter().collect()
        };
        tool_counts.sort();

        let mut out = format!(
            "[Conversation compacted: {user_count} user and {assistant_count} assistant \
             messages summarized.]"
        );
        if !tool_counts.is_empty() {
            let tools = tool_counts
                .iter()
                .map(|(name, n)| format!("{name}x{n}"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("\nTool calls: {tools}"));
        }
        let previews: Vec<String> = evicted
            .iter()
            .rev()
            .take(SUMMARY_PREVIEW_COUNT)
            .rev()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                format!("- {role}: {}", truncate_chars(&m.content, SUMMARY_PREVIEW_CHARS))
            })
            .collect();
        if !previews.is_empty() {
            out.push_str("\nLast messages before compaction:\n");
            out.push_str(&previews.join("\n"));
        }
        out
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let cut: String = s.chars().take(limit).collect();
    format!("{cut}...")
}

// ─── Token estimation ─────────────────────────────────────────────────────────

/// Approximate token count: CJK-class characters cost one token each, all
/// other characters one token per four (integer division).
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for c in text.chars() {
        if is_cjk(c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    cjk + other / 4
}

/// CJK Unified Ideographs, Kana, Hangul, and CJK symbol ranges.
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x11FF        // Hangul Jamo
        | 0x3000..=0x303F      // CJK symbols and punctuation
        | 0x3040..=0x309F      // Hiragana
        | 0x30A0..=0x30FF      // Katakana
        | 0x3130..=0x318F      // Hangul compatibility Jamo
        | 0x4E00..=0x9FFF      // CJK Unified Ideographs
        | 0xAC00..=0xD7AF      // Hangul syllables
        | 0xF900..=0xFAFF      // CJK compatibility ideographs
    )
}

fn message_tokens(msg: &Message) -> usize {
    let mut total = estimate_tokens(&msg.content);
    for tc in &msg.tool_calls {
        total += estimate_tokens(&tc.name) + estimate_tokens(&tc.arguments);
    }
    total.max(1)
}

// ─── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    message: Message,
    tokens: usize,
}

#[derive(Debug)]
struct State {
    system_prompt: String,
    entries: Vec<Entry>,
    token_estimate: usize,
    context_window: usize,
}

/// Ordered conversation log with cached token accounting.
///
/// A single mutex guards all fields; compaction works on the raw state and
/// never re-enters the public accessors.
#[derive(Debug)]
pub struct Session {
    id: String,
    inner: Mutex<State>,
}

impl Session {
    pub fn new(system_prompt: impl Into<String>, context_window: usize) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), system_prompt, context_window)
    }

    pub fn with_id(
        id: impl Into<String>,
        system_prompt: impl Into<String>,
        context_window: usize,
    ) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(State {
                system_prompt: system_prompt.into(),
                entries: Vec::new(),
                token_estimate: 0,
                context_window,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_user(&self, text: impl Into<String>) {
        self.push(Message::user(text));
    }

    pub fn add_assistant(&self, text: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.push(Message::assistant_with_calls(text, tool_calls));
    }

    /// Append tool results as tool-role messages.  Every result must answer
    /// a call ID from the latest assistant message; violations are logged,
    /// not dropped, so the conversation stays inspectable.
    pub fn add_tool_results(&self, results: &[ToolOutput]) {
        let known_ids: Vec<String> = {
            let state = self.inner.lock().expect("session lock poisoned");
            state
                .entries
                .iter()
                .rev()
                .find(|e| e.message.role == Role::Assistant)
                .map(|e| e.message.tool_calls.iter().map(|tc| tc.id.clone()).collect())
                .unwrap_or_default()
        };
        for r in results {
            if !known_ids.iter().any(|id| id == &r.call_id) {
                warn!(call_id = %r.call_id, "tool result without matching assistant tool call");
            }
            self.push(Message::tool_result(&r.call_id, &r.content));
        }
    }

    fn push(&self, message: Message) {
        let tokens = message_tokens(&message);
        let mut state = self.inner.lock().expect("session lock poisoned");
        state.token_estimate += tokens;
        state.entries.push(Entry { message, tokens });
    }

    /// Messages for the next model request: system prompt first.
    pub fn messages_for_llm(&self) -> Vec<Message> {
        let state = self.inner.lock().expect("session lock poisoned");
        let mut out = Vec::with_capacity(state.entries.len() + 1);
        if !state.system_prompt.is_empty() {
            out.push(Message::system(state.system_prompt.clone()));
        }
        out.extend(state.entries.iter().map(|e| e.message.clone()));
        out
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().expect("session lock poisoned").entries.len()
    }

    pub fn token_estimate(&self) -> usize {
        self.inner.lock().expect("session lock poisoned").token_estimate
    }

    pub fn context_window(&self) -> usize {
        self.inner.lock().expect("session lock poisoned").context_window
    }

    pub fn system_prompt(&self) -> String {
        self.inner
            .lock()
            .expect("session lock poisoned")
            .system_prompt
            .clone()
    }

    /// Recompute every cached per-message count and the running estimate.
    pub fn update_token_count(&self) {
        let mut state = self.inner.lock().expect("session lock poisoned");
        let mut total = 0usize;
        for entry in &mut state.entries {
            entry.tokens = message_tokens(&entry.message);
            total += entry.tokens;
        }
        state.token_estimate = total;
    }

    /// Compaction trigger: over half the context window, or too many messages.
    pub fn needs_compaction(&self) -> bool {
        let state = self.inner.lock().expect("session lock poisoned");
        (state.context_window > 0 && state.token_estimate > state.context_window / 2)
            || state.entries.len() >= COMPACTION_MAX_MESSAGES
    }

    /// Compact with the default deterministic summarizer.
    pub fn compact(&self) -> CompactionResult {
        self.compact_with(&TallySummarizer)
    }

    /// Keep the newest messages, replace the evicted prefix with a single
    /// system-role summary, and recompute the token estimate.
    pub fn compact_with(&self, summarizer: &dyn Summarizer) -> CompactionResult {
        let mut state = self.inner.lock().expect("session lock poisoned");
        let original_tokens = state.token_estimate;
        let total = state.entries.len();

        if total <= COMPACTION_KEEP_RECENT {
            return CompactionResult {
                original_tokens,
                new_tokens: original_tokens,
                removed_count: 0,
                remaining_count: total,
                summary: String::new(),
            };
        }

        let split = total - COMPACTION_KEEP_RECENT;
        let kept: Vec<Entry> = state.entries.split_off(split);
        let evicted_messages: Vec<Message> =
            state.entries.iter().map(|e| e.message.clone()).collect();
        let summary = summarizer.summarize(&evicted_messages);

        let summary_message = Message::system(summary.clone());
        let summary_entry = Entry {
            tokens: message_tokens(&summary_message),
            message: summary_message,
        };

        state.entries = Vec::with_capacity(kept.len() + 1);
        state.entries.push(summary_entry);
        state.entries.extend(kept);
        state.token_estimate = state.entries.iter().map(|e| e.tokens).sum();

        debug!(
            removed = split,
            remaining = state.entries.len(),
            tokens_before = original_tokens,
            tokens_after = state.token_estimate,
            "session compacted"
        );

        CompactionResult {
            original_tokens,
            new_tokens: state.token_estimate,
            removed_count: split,
            remaining_count: state.entries.len(),
            summary,
        }
    }

    /// Drop oldest messages until the estimate fits within `target` tokens.
    pub fn compact_to_target(&self, target: usize) {
        let mut state = self.inner.lock().expect("session lock poisoned");
        while state.token_estimate > target && !state.entries.is_empty() {
            let removed = state.entries.remove(0);
            state.token_estimate -= removed.tokens;
        }
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock().expect("session lock poisoned");
        state.entries.clear();
        state.token_estimate = 0;
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Serialize as JSONL: a header line followed by one message per line.
    pub fn to_jsonl(&self) -> String {
        let state = self.inner.lock().expect("session lock poisoned");
        let header = serde_json::json!({
            "id": self.id,
            "system_prompt": state.system_prompt,
            "context_window": state.context_window,
        });
        let mut out = header.to_string();
        out.push('\n');
        for entry in &state.entries {
            if let Ok(line) = serde_json::to_string(&entry.message) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }

    pub fn from_jsonl(text: &str) -> anyhow::Result<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header: serde_json::Value = serde_json::from_str(
            lines.next().ok_or_else(|| anyhow::anyhow!("empty session file"))?,
        )?;
        let id = header["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("session header missing id"))?
            .to_string();
        let system_prompt = header["system_prompt"].as_str().unwrap_or_default().to_string();
        let context_window = header["context_window"].as_u64().unwrap_or(0) as usize;

        let session = Session::with_id(id, system_prompt, context_window);
        for line in lines {
            let message: Message = serde_json::from_str(line)?;
            session.push(message);
        }
        Ok(session)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
