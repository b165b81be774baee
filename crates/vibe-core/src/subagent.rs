// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use vibe_model::{CompletionRequest, ModelProvider, ToolSchema};
use vibe_tools::{ToolOutput, ToolRegistry};

use crate::{
    cancel::CancelToken,
    dispatcher::Dispatcher,
    loop_detector::LoopDetector,
    session::Session,
};

/// Hard cap on sub-agent turns; higher requested values are silently capped.
pub const MAX_SUB_AGENT_TURNS: u32 = 20;

/// Default per-run wall-clock limit.
pub const DEFAULT_SUB_AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Tool schemas hidden from read-only sub-agents.
const WRITE_SCHEMA_NAMES: &[&str] = &["write_file", "edit_file", "notebook_edit"];

/// Description of one sub-agent run.
#[derive(Debug, Clone)]
pub struct SubAgentSpec {
    pub id: String,
    pub system_prompt: String,
    pub task: String,
    pub allow_writes: bool,
    /// Requested turn cap; values above [`MAX_SUB_AGENT_TURNS`] are capped.
    pub max_turns: u32,
    pub timeout: Duration,
}

impl SubAgentSpec {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system_prompt: "You are a focused sub-agent. Complete the given task and reply \
                            with a concise text summary of what you found or did."
                .into(),
            task: task.into(),
            allow_writes: false,
            max_turns: MAX_SUB_AGENT_TURNS,
            timeout: DEFAULT_SUB_AGENT_TIMEOUT,
        }
    }

    pub fn with_writes(mut self, allow: bool) -> Self {
        self.allow_writes = allow;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SubAgentResult {
    pub id: String,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub turns: u32,
}

/// A miniature agent loop with its own fresh session, a turn cap, a hard
/// timeout, and an optional read-only tool view.
pub struct SubAgent {
    spec: SubAgentSpec,
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    model: String,
    dispatcher: Dispatcher,
    /// Paths written by this sub-agent (for orchestrator conflict checks).
    written: Vec<String>,
}

impl SubAgent {
    pub fn new(
        spec: SubAgentSpec,
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        let dispatcher = if spec.allow_writes {
            Dispatcher::new(Arc::clone(&registry))
        } else {
            Dispatcher::read_only(Arc::clone(&registry))
        };
        Self {
            spec,
            provider,
            registry,
            model: model.into(),
            dispatcher,
            written: Vec::new(),
        }
    }

    /// Paths written during the last `run`.
    pub fn written_paths(&self) -> &[String] {
        &self.written
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.registry
            .schemas()
            .iter()
            .filter(|s| self.spec.allow_writes || !WRITE_SCHEMA_NAMES.contains(&s.name.as_str()))
            .map(|s| ToolSchema {
                name: s.name.clone(),
                description: s.description.clone(),
                parameters: s.parameters.clone(),
            })
            .collect()
    }

    /// Run until the first of: text-only reply, loop-detector trip, turn
    /// cap, timeout, cancellation, or provider error.
    pub async fn run(&mut self, cancel: &CancelToken) -> SubAgentResult {
        let started = Instant::now();
        let timeout = self.spec.timeout;
        let id = self.spec.id.clone();

        let result = tokio::time::timeout(timeout, self.run_inner(cancel, started)).await;
        match result {
            Ok(outcome) => outcome,
            Err(_) => SubAgentResult {
                id,
                output: String::new(),
                error: Some(format!("timed out after {}s", timeout.as_secs())),
                duration: started.elapsed(),
                turns: 0,
            },
        }
    }

    async fn run_inner(&mut self, cancel: &CancelToken, started: Instant) -> SubAgentResult {
        let session = Session::new(self.spec.system_prompt.clone(), 128_000);
        session.add_user(self.spec.task.clone());
        let mut detector = LoopDetector::new();
        let max_turns = self.spec.max_turns.min(MAX_SUB_AGENT_TURNS);
        let mut turns = 0u32;

        let finish = |output: String, error: Option<String>, turns: u32| SubAgentResult {
            id: self.spec.id.clone(),
            output,
            error,
            duration: started.elapsed(),
            turns,
        };

        loop {
            if cancel.is_cancelled() {
                return finish(String::new(), Some("cancelled".into()), turns);
            }
            if turns >= max_turns {
                return finish(
                    String::new(),
                    Some(format!("turn cap reached ({max_turns})")),
                    turns,
                );
            }
            turns += 1;

            let request = CompletionRequest {
                model: self.model.clone(),
                messages: session.messages_for_llm(),
                tools: self.tool_schemas(),
                stream: false,
                temperature: None,
                max_tokens: None,
            };
            let response = match self.provider.complete(&request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(id = %self.spec.id, error = %e, "sub-agent provider error");
                    return finish(String::new(), Some(format!("provider error: {e}")), turns);
                }
            };

            if response.tool_calls.is_empty() {
                debug!(id = %self.spec.id, turns, "sub-agent finished with text");
                return finish(response.content, None, turns);
            }

            session.add_assistant(response.content.clone(), response.tool_calls.clone());
            for tc in &response.tool_calls {
                detector.record(&tc.name, &tc.arguments);
            }
            if detector.should_abort() {
                let aborted: Vec<ToolOutput> = response
                    .tool_calls
                    .iter()
                    .map(|tc| ToolOutput::err(&tc.id, "aborted due to loop"))
                    .collect();
                session.add_tool_results(&aborted);
                return finish(String::new(), Some("loop detected".into()), turns);
            }

            let results = self
                .dispatcher
                .execute_tool_calls(cancel, &response.tool_calls)
                .await;
            session.add_tool_results(&results);

            if session.needs_compaction() {
                session.compact();
            }
        }
    }

    /// Collect write-log entries accumulated by the dispatcher.
    pub fn collect_written(&mut self) {
        self.written = self.dispatcher.written_paths();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use vibe_model::ScriptedProvider;
    use vibe_tools::{Tool, ToolConfig};

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &vibe_tools::ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("ran {}", self.name))
        }
    }

    fn registry_with(names: &[&'static str]) -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        for name in names {
            registry.register(EchoTool { name }, ToolConfig::default());
        }
        registry
    }

    #[tokio::test]
    async fn finishes_on_text_reply() {
        let provider = Arc::new(ScriptedProvider::always_text("task complete"));
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "do it"),
            provider,
            registry_with(&[]),
            "m",
        );
        let result = sa.run(&CancelToken::new()).await;
        assert!(result.error.is_none());
        assert_eq!(result.output, "task complete");
        assert_eq!(result.turns, 1);
        assert_eq!(result.id, "agent-1");
    }

    #[tokio::test]
    async fn runs_tools_then_finishes() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[("c1", "grep", r#"{"pattern":"x"}"#)]),
            ScriptedProvider::text("found it"),
        ]));
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "search"),
            provider,
            registry_with(&["grep"]),
            "m",
        );
        let result = sa.run(&CancelToken::new()).await;
        assert!(result.error.is_none());
        assert_eq!(result.output, "found it");
        assert_eq!(result.turns, 2);
    }

    #[tokio::test]
    async fn turn_cap_is_silently_capped_and_enforced() {
        // Script more tool-call turns than the cap allows; alternate tools
        // with distinct arguments so the loop detector stays quiet.
        let scripts: Vec<_> = (0..30)
            .map(|i| {
                ScriptedProvider::calling(&[(
                    &format!("c{i}"),
                    if i % 2 == 0 { "grep" } else { "read_file" },
                    &format!(r#"{{"i":{i}}}"#),
                )])
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let mut spec = SubAgentSpec::new("agent-1", "never finish");
        spec.max_turns = 9999; // must be capped to 20
        let mut sa = SubAgent::new(spec, provider, registry_with(&["grep", "read_file"]), "m");
        let result = sa.run(&CancelToken::new()).await;
        assert_eq!(
            result.error.as_deref(),
            Some(format!("turn cap reached ({MAX_SUB_AGENT_TURNS})").as_str())
        );
        assert_eq!(result.turns, MAX_SUB_AGENT_TURNS);
    }

    #[tokio::test]
    async fn read_only_subagent_hides_write_schemas() {
        let provider = Arc::new(ScriptedProvider::always_text("ok"));
        let last_request = Arc::clone(&provider.last_request);
        let registry = registry_with(&["read_file", "write_file", "edit_file", "bash"]);
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "look around"),
            provider,
            registry,
            "m",
        );
        sa.run(&CancelToken::new()).await;
        let req = last_request.lock().unwrap().clone().unwrap();
        let names: Vec<&str> = req.tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"read_file"));
        assert!(names.contains(&"bash"), "bash stays visible to sub-agents");
        assert!(!names.contains(&"write_file"));
        assert!(!names.contains(&"edit_file"));
    }

    #[tokio::test]
    async fn write_enabled_subagent_sees_write_schemas() {
        let provider = Arc::new(ScriptedProvider::always_text("ok"));
        let last_request = Arc::clone(&provider.last_request);
        let registry = registry_with(&["write_file", "read_file"]);
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "edit stuff").with_writes(true),
            provider,
            registry,
            "m",
        );
        sa.run(&CancelToken::new()).await;
        let req = last_request.lock().unwrap().clone().unwrap();
        assert!(req.tools.iter().any(|t| t.name == "write_file"));
    }

    #[tokio::test]
    async fn read_only_subagent_rejects_write_calls_at_dispatch() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[("c1", "edit_file", r#"{"path":"x"}"#)]),
            ScriptedProvider::text("fine"),
        ]));
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "try to edit"),
            provider,
            registry_with(&["edit_file"]),
            "m",
        );
        let result = sa.run(&CancelToken::new()).await;
        // The call was rejected with an error result, the run still finished.
        assert!(result.error.is_none());
        assert_eq!(result.output, "fine");
    }

    #[tokio::test]
    async fn loop_detection_aborts_run() {
        let call = ("c", "grep", r#"{"pattern":"same"}"#);
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[call]),
            ScriptedProvider::calling(&[call]),
            ScriptedProvider::calling(&[call]),
        ]));
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "spin"),
            provider,
            registry_with(&["grep"]),
            "m",
        );
        let result = sa.run(&CancelToken::new()).await;
        assert_eq!(result.error.as_deref(), Some("loop detected"));
    }

    #[tokio::test]
    async fn cancelled_subagent_reports_cancelled() {
        let provider = Arc::new(ScriptedProvider::always_text("unreachable"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sa = SubAgent::new(
            SubAgentSpec::new("agent-1", "task"),
            provider,
            registry_with(&[]),
            "m",
        );
        let result = sa.run(&cancel).await;
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(result.turns, 0);
    }

    #[tokio::test]
    async fn timeout_produces_error_result() {
        struct SlowProvider;
        #[async_trait]
        impl ModelProvider for SlowProvider {
            fn name(&self) -> &str {
                "slow"
            }
            fn model_name(&self) -> &str {
                "slow"
            }
            async fn complete(
                &self,
                _req: &CompletionRequest,
            ) -> anyhow::Result<vibe_model::CompletionResponse> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vibe_model::CompletionResponse::default())
            }
        }
        let mut spec = SubAgentSpec::new("agent-1", "slow task");
        spec.timeout = Duration::from_millis(50);
        let mut sa = SubAgent::new(spec, Arc::new(SlowProvider), registry_with(&[]), "m");
        let result = sa.run(&CancelToken::new()).await;
        assert!(result.error.as_deref().unwrap_or("").contains("timed out"));
    }
}
