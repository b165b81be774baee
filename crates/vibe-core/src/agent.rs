// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vibe_config::Config;
use vibe_model::{CompletionRequest, ModelProvider, ToolSchema};
use vibe_tools::{ToolOutput, ToolRegistry};

use crate::{
    autotest::AutoTester,
    cancel::CancelToken,
    dispatcher::{is_write, Dispatcher},
    events::AgentEvent,
    loop_detector::LoopDetector,
    session::Session,
};

/// Ceiling on model round-trips inside one `run`.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The model produced a final text answer.
    Completed,
    /// The loop detector tripped.
    Looped,
    /// The iteration budget ran out.
    Exhausted,
    /// The caller cancelled the run.
    Cancelled,
    /// The provider failed terminally.
    Errored,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub explanation: String,
    /// The last assistant text, if any.
    pub final_text: String,
    pub iterations: u32,
}

/// Shrink the output budget as the session deepens to pressure the model
/// toward convergence: full budget for the first three iterations, half
/// through iteration ten, a quarter beyond that.
pub fn dynamic_max_tokens(base: u32, iteration: u32) -> u32 {
    if iteration <= 3 {
        base
    } else if iteration <= 10 {
        base / 2
    } else {
        base / 4
    }
}

/// The top-level agent loop: prompt build → model call → parse → dispatch →
/// session update → termination decision.
pub struct Agent {
    session: Arc<Session>,
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<Dispatcher>,
    loop_detector: LoopDetector,
    provider: Arc<dyn ModelProvider>,
    model: String,
    temperature: Option<f32>,
    base_max_tokens: u32,
    max_iterations: u32,
    plan_mode: bool,
    auto_test_enabled: bool,
    auto_tester: AutoTester,
    cancel: CancelToken,
    events: Option<mpsc::Sender<AgentEvent>>,
    iteration_count: u32,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        session: Arc<Session>,
        config: &Config,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
        dispatcher.set_plan_mode(config.agent.plan_mode);
        Self {
            session,
            registry,
            dispatcher,
            loop_detector: LoopDetector::new(),
            provider,
            model: config.model.name.clone(),
            temperature: config.model.temperature,
            base_max_tokens: config.model.max_tokens.unwrap_or(8192),
            max_iterations: config.agent.max_iterations.max(1),
            plan_mode: config.agent.plan_mode,
            auto_test_enabled: config.agent.auto_test,
            auto_tester: AutoTester {
                timeout: std::time::Duration::from_secs(config.agent.auto_test_timeout_secs),
            },
            cancel: CancelToken::new(),
            events: None,
            iteration_count: 0,
        }
    }

    /// Stream [`AgentEvent`]s to the given channel during runs.
    pub fn with_events(mut self, tx: mpsc::Sender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn set_plan_mode(&mut self, on: bool) {
        self.plan_mode = on;
        self.dispatcher.set_plan_mode(on);
    }

    pub fn plan_mode(&self) -> bool {
        self.plan_mode
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Tool schemas for the next request.  Plan mode hides write-class
    /// tools from the model entirely.
    fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.registry
            .schemas()
            .iter()
            .filter(|s| !(self.plan_mode && is_write(&s.name)))
            .map(|s| ToolSchema {
                name: s.name.clone(),
                description: s.description.clone(),
                parameters: s.parameters.clone(),
            })
            .collect()
    }

    /// Run the loop on one user goal until a terminal state.
    ///
    /// Provider failures terminate the run with `Errored` rather than
    /// propagating: the session stays consistent and resumable either way.
    pub async fn run(&mut self, goal: &str) -> RunOutcome {
        self.session.add_user(goal);
        self.loop_detector.reset();
        let mut final_text = String::new();

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break self.finish(RunStatus::Cancelled, "cancelled by caller", &final_text);
            }
            if self.iteration_count >= self.max_iterations {
                break self.finish(
                    RunStatus::Exhausted,
                    format!("reached maximum iterations ({})", self.max_iterations),
                    &final_text,
                );
            }
            self.iteration_count += 1;
            let iteration = self.iteration_count;
            self.emit(AgentEvent::IterationStarted { iteration }).await;

            let request = CompletionRequest {
                model: self.model.clone(),
                messages: self.session.messages_for_llm(),
                tools: self.tool_schemas(),
                stream: false,
                temperature: self.temperature,
                max_tokens: Some(dynamic_max_tokens(self.base_max_tokens, iteration)),
            };

            let response = match self.provider.complete(&request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "provider error; terminating run");
                    break self.finish(
                        RunStatus::Errored,
                        format!("provider error: {e}"),
                        &final_text,
                    );
                }
            };

            if self.cancel.is_cancelled() {
                // Append nothing after cancellation is observed.
                break self.finish(RunStatus::Cancelled, "cancelled by caller", &final_text);
            }

            if !response.content.is_empty() {
                final_text = response.content.clone();
                self.emit(AgentEvent::AssistantText(response.content.clone()))
                    .await;
            }

            if response.tool_calls.is_empty() {
                self.session.add_assistant(response.content, Vec::new());
                break self.finish(
                    RunStatus::Completed,
                    "model returned a final answer",
                    &final_text,
                );
            }

            self.session
                .add_assistant(response.content.clone(), response.tool_calls.clone());

            for tc in &response.tool_calls {
                self.emit(AgentEvent::ToolCallStarted(tc.clone())).await;
                self.loop_detector.record(&tc.name, &tc.arguments);
            }

            if self.loop_detector.should_abort() {
                let aborted: Vec<ToolOutput> = response
                    .tool_calls
                    .iter()
                    .map(|tc| ToolOutput::err(&tc.id, "aborted due to loop"))
                    .collect();
                self.session.add_tool_results(&aborted);
                let explanation = match self.loop_detector.loop_info() {
                    Some(info) => format!(
                        "loop detected: {} repeated {} times",
                        info.tool_name, info.repeat_count
                    ),
                    None => "loop detected".to_string(),
                };
                break self.finish(RunStatus::Looped, explanation, &final_text);
            }

            let results = self
                .dispatcher
                .execute_tool_calls(&self.cancel, &response.tool_calls)
                .await;
            for (tc, result) in response.tool_calls.iter().zip(results.iter()) {
                self.emit(AgentEvent::ToolCallFinished {
                    call_id: result.call_id.clone(),
                    tool_name: tc.name.clone(),
                    output: result.content.clone(),
                    is_error: result.is_error,
                })
                .await;
            }
            self.session.add_tool_results(&results);

            if self.auto_test_enabled {
                self.run_auto_tests(&response.tool_calls, &results).await;
            }

            if self.session.needs_compaction() {
                let tokens_before = self.session.token_estimate();
                let result = self.session.compact();
                debug!(
                    removed = result.removed_count,
                    tokens_before,
                    tokens_after = result.new_tokens,
                    "compacted session mid-run"
                );
                self.emit(AgentEvent::Compacted {
                    tokens_before: result.original_tokens,
                    tokens_after: result.new_tokens,
                    removed_messages: result.removed_count,
                })
                .await;
            }
        };

        self.emit(AgentEvent::RunFinished {
            status: outcome.status,
            explanation: outcome.explanation.clone(),
        })
        .await;
        outcome
    }

    /// After a write-class call touches a script file, run the matching
    /// syntax check and inject failures back into the conversation so the
    /// model sees them next iteration.
    async fn run_auto_tests(&self, calls: &[vibe_model::ToolCall], results: &[ToolOutput]) {
        for (tc, result) in calls.iter().zip(results.iter()) {
            if result.is_error || !is_write(&tc.name) {
                continue;
            }
            let Some(path) = serde_json::from_str::<serde_json::Value>(&tc.arguments)
                .ok()
                .and_then(|v| v.get("path").and_then(|p| p.as_str()).map(str::to_string))
            else {
                continue;
            };
            if !AutoTester::is_script_path(&path) {
                continue;
            }
            if let Some(outcome) = self.auto_tester.run_for(&path).await {
                if !outcome.success {
                    debug!(path = %path, "auto-test failed; injecting output");
                    self.session.add_tool_results(&[ToolOutput::ok(
                        &tc.id,
                        format!("[auto-test] {path} failed:\n{}", outcome.output),
                    )]);
                }
            }
        }
    }

    fn finish(
        &self,
        status: RunStatus,
        explanation: impl Into<String>,
        final_text: &str,
    ) -> RunOutcome {
        RunOutcome {
            status,
            explanation: explanation.into(),
            final_text: final_text.to_string(),
            iterations: self.iteration_count,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use vibe_model::{CompletionResponse, Role, ScriptedProvider};
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

    struct FailingProvider;

    #[async_trait]
    impl ModelProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(
            &self,
            _req: &CompletionRequest,
        ) -> anyhow::Result<CompletionResponse> {
            anyhow::bail!("connection reset by peer")
        }
    }

    fn registry_with(names: &[&'static str]) -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        for name in names {
            registry.register(EchoTool { name }, ToolConfig::default());
        }
        registry
    }

    fn agent(provider: Arc<dyn ModelProvider>, registry: Arc<ToolRegistry>) -> Agent {
        let config = Config::default();
        let session = Arc::new(Session::new("you are a coding agent", 1_000_000));
        Agent::new(provider, registry, session, &config)
    }

    // ── DynamicMaxTokens ──────────────────────────────────────────────────────

    #[test]
    fn dynamic_max_tokens_steps_down_with_iterations() {
        let expected = [
            (1, 8192),
            (2, 8192),
            (3, 8192),
            (4, 4096),
            (10, 4096),
            (11, 2048),
            (12, 2048),
            (50, 2048),
        ];
        for (iter, want) in expected {
            assert_eq!(dynamic_max_tokens(8192, iter), want, "iteration {iter}");
        }
    }

    // ── Terminal states ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn text_only_response_completes() {
        let provider = Arc::new(ScriptedProvider::always_text("all done"));
        let mut a = agent(provider, registry_with(&[]));
        let outcome = a.run("do the thing").await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.final_text, "all done");
        assert_eq!(outcome.iterations, 1);
        // user + assistant in the session
        assert_eq!(a.session().message_count(), 2);
    }

    #[tokio::test]
    async fn tool_call_round_then_completion() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[("c1", "read_file", r#"{"path":"x"}"#)]),
            ScriptedProvider::text("saw the file"),
        ]));
        let mut a = agent(provider, registry_with(&["read_file"]));
        let outcome = a.run("read it").await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.iterations, 2);

        let msgs = a.session().messages_for_llm();
        // system, user, assistant(tool_calls), tool, assistant
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[2].tool_calls.len(), 1);
        assert_eq!(msgs[3].role, Role::Tool);
        assert!(msgs[3].content.contains("ran read_file"));
    }

    #[tokio::test]
    async fn repeated_identical_calls_terminate_as_looped() {
        let call = ("c", "read_file", "{}");
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[call]),
            ScriptedProvider::calling(&[call]),
            ScriptedProvider::calling(&[call]),
            ScriptedProvider::calling(&[call]),
        ]));
        let mut a = agent(provider, registry_with(&["read_file"]));
        let outcome = a.run("spin").await;
        assert_eq!(outcome.status, RunStatus::Looped);
        assert!(outcome.explanation.contains("read_file"));
        assert_eq!(outcome.iterations, 3, "stuck run aborts on the third record");

        // The aborted calls got synthetic results, keeping the session valid.
        let msgs = a.session().messages_for_llm();
        let last = msgs.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("aborted due to loop"));
    }

    #[tokio::test]
    async fn iteration_budget_exhausts() {
        // Provider calls a different argument each time so no loop trips.
        let scripts: Vec<CompletionResponse> = (0..10)
            .map(|i| {
                ScriptedProvider::calling(&[(
                    "c",
                    if i % 2 == 0 { "read_file" } else { "grep" },
                    &format!(r#"{{"n":{i}}}"#),
                )])
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let registry = registry_with(&["read_file", "grep"]);
        let config = Config {
            agent: vibe_config::AgentConfig {
                max_iterations: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let session = Arc::new(Session::new("sys", 1_000_000));
        let mut a = Agent::new(provider, registry, session, &config);
        let outcome = a.run("never stop").await;
        assert_eq!(outcome.status, RunStatus::Exhausted);
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn pre_cancelled_run_terminates_immediately() {
        let provider = Arc::new(ScriptedProvider::always_text("unreachable"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut a = agent(provider, registry_with(&[])).with_cancel(cancel);
        let outcome = a.run("goal").await;
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.iterations, 0);
    }

    #[tokio::test]
    async fn provider_error_terminates_as_errored() {
        let mut a = agent(Arc::new(FailingProvider), registry_with(&[]));
        let outcome = a.run("goal").await;
        assert_eq!(outcome.status, RunStatus::Errored);
        assert!(outcome.explanation.contains("connection reset"));
        // The user goal is preserved for resume.
        assert_eq!(a.session().message_count(), 1);
    }

    // ── Request construction ──────────────────────────────────────────────────

    #[tokio::test]
    async fn request_carries_dynamic_max_tokens() {
        let provider = Arc::new(ScriptedProvider::always_text("done"));
        let last_request = Arc::clone(&provider.last_request);
        let mut a = agent(provider, registry_with(&[]));
        a.run("hello").await;
        let req = last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.max_tokens, Some(8192), "first iteration gets the full budget");
        assert!(!req.stream);
    }

    #[tokio::test]
    async fn plan_mode_strips_write_schemas_from_request() {
        let provider = Arc::new(ScriptedProvider::always_text("done"));
        let last_request = Arc::clone(&provider.last_request);
        let registry = registry_with(&["read_file", "write_file", "bash", "grep"]);
        let mut a = agent(provider, registry);
        a.set_plan_mode(true);
        a.run("plan something").await;

        let req = last_request.lock().unwrap().clone().unwrap();
        let names: Vec<&str> = req.tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"read_file"));
        assert!(names.contains(&"grep"));
        assert!(!names.contains(&"write_file"));
        assert!(!names.contains(&"bash"));
    }

    #[tokio::test]
    async fn plan_mode_rejects_write_calls_at_dispatch() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[("c1", "write_file", r#"{"path":"x","content":"y"}"#)]),
            ScriptedProvider::text("ok I will not write"),
        ]));
        let mut a = agent(provider, registry_with(&["write_file"]));
        a.set_plan_mode(true);
        let outcome = a.run("sneaky write").await;
        assert_eq!(outcome.status, RunStatus::Completed);
        let msgs = a.session().messages_for_llm();
        let tool_msg = msgs.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("plan mode"));
    }

    // ── Auto-test injection ───────────────────────────────────────────────────

    #[tokio::test]
    async fn failed_auto_test_is_injected_into_session() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.sh");
        std::fs::write(&bad, "if then fi done\n").unwrap();
        let args = format!(r#"{{"path":"{}","content":"x"}}"#, bad.display());

        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[("c1", "write_file", &args)]),
            ScriptedProvider::text("done"),
        ]));
        let registry = registry_with(&["write_file"]);
        let config = Config {
            agent: vibe_config::AgentConfig {
                auto_test: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let session = Arc::new(Session::new("sys", 1_000_000));
        let mut a = Agent::new(provider, registry, session, &config);
        let outcome = a.run("write the script").await;
        assert_eq!(outcome.status, RunStatus::Completed);

        let msgs = a.session().messages_for_llm();
        assert!(
            msgs.iter().any(|m| m.content.contains("[auto-test]")),
            "auto-test failure must be visible to the model"
        );
    }

    // ── Events ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn events_are_emitted_through_the_channel() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::calling(&[("c1", "grep", r#"{"pattern":"x"}"#)]),
            ScriptedProvider::text("finished"),
        ]));
        let (tx, mut rx) = mpsc::channel(64);
        let mut a = agent(provider, registry_with(&["grep"])).with_events(tx);
        a.run("search").await;

        let mut saw_iteration = false;
        let mut saw_tool_finished = false;
        let mut saw_run_finished = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                AgentEvent::IterationStarted { .. } => saw_iteration = true,
                AgentEvent::ToolCallFinished { .. } => saw_tool_finished = true,
                AgentEvent::RunFinished { status, .. } => {
                    saw_run_finished = true;
                    assert_eq!(status, RunStatus::Completed);
                }
                _ => {}
            }
        }
        assert!(saw_iteration && saw_tool_finished && saw_run_finished);
    }
}
