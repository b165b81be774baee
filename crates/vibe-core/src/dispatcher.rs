// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{debug, warn};

use vibe_model::ToolCall;
use vibe_tools::{FailureStrategy, ToolOutput, ToolRegistry};

use crate::cancel::CancelToken;

/// Tools that never mutate state and may run concurrently.
pub const READ_ONLY_TOOLS: &[&str] = &["read_file", "glob", "grep", "web_search", "web_fetch"];

/// Tools that mutate the filesystem or run arbitrary commands.
pub const WRITE_TOOLS: &[&str] = &["write_file", "edit_file", "bash"];

/// Cheap local read-only tools (no network).
pub const SAFE_TOOLS: &[&str] = &["read_file", "glob", "grep"];

/// Tools banned for read-only sub-agents.
const SUBAGENT_WRITE_BANNED: &[&str] = &["write_file", "edit_file", "notebook_edit"];

/// Ceiling on the size of a parallel batch.
pub const MAX_PARALLEL_TOOLS: usize = 10;

/// Error substrings that allow a retry (case-insensitive).
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "connection refused",
    "temporary failure",
    "rate limit",
    "network unreachable",
    "temporary",
];

/// Error substrings that short-circuit the retry loop (case-insensitive).
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "permission denied",
    "access denied",
    "not found",
    "invalid parameter",
    "tool not found",
];

pub fn is_read_only(name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&name)
}

pub fn is_write(name: &str) -> bool {
    WRITE_TOOLS.contains(&name)
}

pub fn is_safe(name: &str) -> bool {
    SAFE_TOOLS.contains(&name)
}

/// Executes batches of tool calls with parallel/sequential policy, retries,
/// and per-tool failure strategies.  Results always come back in input
/// order, one per call.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    plan_mode: AtomicBool,
    /// Sub-agent read-only mode: mutating tools are rejected at dispatch.
    restrict_writes: bool,
    /// Paths successfully written this run (for conflict detection).
    write_log: Mutex<Vec<String>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            plan_mode: AtomicBool::new(false),
            restrict_writes: false,
            write_log: Mutex::new(Vec::new()),
        }
    }

    /// Dispatcher for a read-only sub-agent: write_file/edit_file/
    /// notebook_edit are rejected outright.
    pub fn read_only(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            plan_mode: AtomicBool::new(false),
            restrict_writes: true,
            write_log: Mutex::new(Vec::new()),
        }
    }

    pub fn set_plan_mode(&self, on: bool) {
        self.plan_mode.store(on, Ordering::Relaxed);
    }

    pub fn plan_mode(&self) -> bool {
        self.plan_mode.load(Ordering::Relaxed)
    }

    /// Paths written by successful write-class calls so far.
    pub fn written_paths(&self) -> Vec<String> {
        self.write_log.lock().expect("write log poisoned").clone()
    }

    /// True when the whole batch may run concurrently: every call is
    /// read-only and the batch is small enough.
    pub fn can_parallelize(&self, calls: &[ToolCall]) -> bool {
        calls.len() <= MAX_PARALLEL_TOOLS && calls.iter().all(|c| is_read_only(&c.name))
    }

    /// Execute a list of calls and return one result per call, in order.
    ///
    /// Read-only batches run concurrently.  Mixed/write batches run
    /// sequentially; the first failing write-class call stops execution and
    /// the remaining calls come back as not-executed errors so the result
    /// list always matches the input length.
    pub async fn execute_tool_calls(
        &self,
        cancel: &CancelToken,
        calls: &[ToolCall],
    ) -> Vec<ToolOutput> {
        if calls.is_empty() {
            return Vec::new();
        }

        if self.can_parallelize(calls) {
            debug!(count = calls.len(), "executing read-only batch in parallel");
            return join_all(calls.iter().map(|c| self.execute_one(c))).await;
        }

        let mut results = Vec::with_capacity(calls.len());
        let mut stopped: Option<&'static str> = None;
        for call in calls {
            if let Some(reason) = stopped {
                results.push(ToolOutput::err(&call.id, format!("not executed: {reason}")));
                continue;
            }
            if cancel.is_cancelled() {
                results.push(ToolOutput::err(&call.id, "not executed: cancelled"));
                stopped = Some("cancelled");
                continue;
            }
            let result = self.execute_one(call).await;
            let failed_write = result.is_error && is_write(&call.name);
            results.push(result);
            if failed_write {
                warn!(tool = %call.name, "write-class tool failed; aborting batch remainder");
                stopped = Some("earlier write-tool failure aborted the batch");
            }
        }
        results
    }

    /// Execute one call under the tool's registered retry/failure policy.
    pub async fn execute_one(&self, call: &ToolCall) -> ToolOutput {
        if self.plan_mode() && is_write(&call.name) {
            return ToolOutput::err(
                &call.id,
                format!("{} is disabled in plan mode", call.name),
            );
        }
        if self.restrict_writes && SUBAGENT_WRITE_BANNED.contains(&call.name.as_str()) {
            return ToolOutput::err(
                &call.id,
                format!("{} is not available to this sub-agent", call.name),
            );
        }

        let Some((tool, config)) = self.registry.get(&call.name) else {
            return ToolOutput::err(&call.id, format!("Tool not found: {}", call.name));
        };

        let tool_call = vibe_tools::ToolCall::from_arguments(&call.id, &call.name, &call.arguments);
        let max_attempts = config.max_retries + 1;
        let mut last = ToolOutput::err(&call.id, "tool did not run");

        for attempt in 1..=max_attempts {
            let out = tool.execute(&tool_call).await;
            if !out.is_error {
                self.record_write(call);
                return out;
            }
            let text = out.content.to_lowercase();
            last = out;
            if matches_any(&text, NON_RETRYABLE_PATTERNS) {
                debug!(tool = %call.name, "non-retryable error; skipping retries");
                break;
            }
            if attempt < max_attempts && matches_any(&text, RETRYABLE_PATTERNS) {
                debug!(tool = %call.name, attempt, "retryable error; backing off");
                tokio::time::sleep(config.retry_backoff).await;
                continue;
            }
            break;
        }

        match config.failure_strategy {
            FailureStrategy::Fatal | FailureStrategy::Retry => last,
            FailureStrategy::Skip => ToolOutput::ok(
                &call.id,
                format!(
                    "{} skipped due to failure, continuing without it",
                    call.name
                ),
            ),
            FailureStrategy::Fallback => ToolOutput::ok(&call.id, fallback_output(&call.name)),
        }
    }

    fn record_write(&self, call: &ToolCall) {
        if !is_write(&call.name) && call.name != "notebook_edit" {
            return;
        }
        let path = serde_json::from_str::<serde_json::Value>(&call.arguments)
            .ok()
            .and_then(|v| v.get("path").and_then(|p| p.as_str()).map(str::to_string));
        if let Some(path) = path {
            self.write_log.lock().expect("write log poisoned").push(path);
        }
    }

    /// Pre-check a call without executing it: the tool must exist and any
    /// non-empty arguments must parse as JSON.
    pub fn validate_tool_call(&self, call: &ToolCall) -> Result<(), String> {
        if !self.registry.contains(&call.name) {
            return Err(format!("Tool not found: {}", call.name));
        }
        if !call.arguments.trim().is_empty()
            && serde_json::from_str::<serde_json::Value>(&call.arguments).is_err()
        {
            return Err(format!("invalid JSON arguments for {}", call.name));
        }
        Ok(())
    }

    /// Run a list of batches in order, checking for cancellation between
    /// batches and returning the accumulated results early when cancelled.
    pub async fn execute_batch(
        &self,
        cancel: &CancelToken,
        batches: &[Vec<ToolCall>],
    ) -> Vec<ToolOutput> {
        let mut results = Vec::new();
        for batch in batches {
            if cancel.is_cancelled() {
                debug!("cancelled between batches; returning partial results");
                return results;
            }
            results.extend(self.execute_tool_calls(cancel, batch).await);
        }
        results
    }

    /// Split a mixed list into one batch of all read-only calls (order
    /// preserved) followed by each remaining call as its own batch.
    pub fn group_for_parallel(&self, calls: &[ToolCall]) -> Vec<Vec<ToolCall>> {
        let read_only: Vec<ToolCall> = calls
            .iter()
            .filter(|c| is_read_only(&c.name))
            .cloned()
            .collect();
        let mut batches = Vec::new();
        if !read_only.is_empty() {
            batches.push(read_only);
        }
        for call in calls.iter().filter(|c| !is_read_only(&c.name)) {
            batches.push(vec![call.clone()]);
        }
        batches
    }
}

fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

/// Canned replacement for tools with the Fallback strategy: empty-result
/// sentinels for search tools, an unavailability note for everything else.
fn fallback_output(name: &str) -> String {
    match name {
        "glob" | "grep" => "(no matches)".to_string(),
        "web_search" => "(no results)".to_string(),
        other => format!("{other} is currently unavailable"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use vibe_tools::{Tool, ToolConfig};

    fn mcall(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    /// Records invocation count; fails the first `fail_times` attempts with
    /// the given error text.
    struct FlakyTool {
        name: &'static str,
        error: &'static str,
        fail_times: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "flaky test tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &vibe_tools::ToolCall) -> ToolOutput {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                ToolOutput::err(&call.id, self.error)
            } else {
                ToolOutput::ok(&call.id, "recovered")
            }
        }
    }

    /// Echoes its id after an optional delay.
    struct NamedEcho {
        name: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for NamedEcho {
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
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            ToolOutput::ok(&call.id, format!("echo {}", call.id))
        }
    }

    struct AlwaysFails {
        name: &'static str,
        error: &'static str,
    }

    #[async_trait]
    impl Tool for AlwaysFails {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &vibe_tools::ToolCall) -> ToolOutput {
            ToolOutput::err(&call.id, self.error)
        }
    }

    fn quick_retry() -> ToolConfig {
        ToolConfig::default().with_retries(2, Duration::from_millis(1))
    }

    // ── Classification ────────────────────────────────────────────────────────

    #[test]
    fn classification_sets_are_disjoint_where_expected() {
        for name in SAFE_TOOLS {
            assert!(is_read_only(name), "safe tools are read-only");
        }
        for name in WRITE_TOOLS {
            assert!(!is_read_only(name), "write tools are not read-only");
        }
    }

    #[test]
    fn read_only_batch_within_cap_parallelizes() {
        let d = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let calls: Vec<ToolCall> = (0..MAX_PARALLEL_TOOLS)
            .map(|i| mcall(&format!("c{i}"), "read_file", "{}"))
            .collect();
        assert!(d.can_parallelize(&calls));
    }

    #[test]
    fn oversized_batch_does_not_parallelize() {
        let d = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let calls: Vec<ToolCall> = (0..MAX_PARALLEL_TOOLS + 1)
            .map(|i| mcall(&format!("c{i}"), "grep", "{}"))
            .collect();
        assert!(!d.can_parallelize(&calls));
    }

    #[test]
    fn batch_with_write_tool_does_not_parallelize() {
        let d = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let calls = vec![
            mcall("a", "read_file", "{}"),
            mcall("b", "write_file", "{}"),
        ];
        assert!(!d.can_parallelize(&calls));
    }

    // ── Ordered results ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn parallel_results_preserve_input_order() {
        // First call is slower; order must still be [a, b].
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            NamedEcho {
                name: "read_file",
                delay_ms: 30,
            },
            ToolConfig::default(),
        );
        registry.register(
            NamedEcho {
                name: "grep",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        let d = Dispatcher::new(registry);
        let calls = vec![mcall("a", "read_file", "{}"), mcall("b", "grep", "{}")];
        let results = d.execute_tool_calls(&CancelToken::new(), &calls).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "a");
        assert_eq!(results[1].call_id, "b");
        assert!(!results[0].is_error);
    }

    #[tokio::test]
    async fn result_count_always_matches_input_count() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            AlwaysFails {
                name: "write_file",
                error: "disk exploded",
            },
            ToolConfig::new(Default::default(), FailureStrategy::Fatal),
        );
        registry.register(NamedEcho { name: "grep", delay_ms: 0 }, ToolConfig::default());
        let d = Dispatcher::new(registry);
        // Mixed batch → sequential; the write failure stops execution but
        // every call still gets a result.
        let calls = vec![
            mcall("1", "write_file", "{}"),
            mcall("2", "grep", "{}"),
            mcall("3", "grep", "{}"),
        ];
        let results = d.execute_tool_calls(&CancelToken::new(), &calls).await;
        assert_eq!(results.len(), calls.len());
        assert!(results[0].is_error);
        assert!(results[1].content.contains("not executed"));
        assert!(results[2].content.contains("not executed"));
    }

    #[tokio::test]
    async fn read_only_failure_does_not_stop_sequential_batch() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            AlwaysFails {
                name: "grep",
                error: "some grep failure",
            },
            ToolConfig::new(Default::default(), FailureStrategy::Fatal),
        );
        registry.register(
            NamedEcho {
                name: "bash",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        let d = Dispatcher::new(registry);
        // bash makes the batch sequential; grep's failure must not stop it.
        let calls = vec![
            mcall("1", "grep", "{}"),
            mcall("2", "bash", "{}"),
        ];
        let results = d.execute_tool_calls(&CancelToken::new(), &calls).await;
        assert!(results[0].is_error);
        assert!(!results[1].is_error, "batch continued past read-only failure");
    }

    // ── Retry behavior ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn retryable_error_is_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            FlakyTool {
                name: "web_fetch",
                error: "connection refused by host",
                fail_times: 2,
                calls: Arc::clone(&calls),
            },
            quick_retry(),
        );
        let d = Dispatcher::new(registry);
        let out = d.execute_one(&mcall("1", "web_fetch", "{}")).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "two retries then success");
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            FlakyTool {
                name: "read_file",
                error: "Permission denied while reading",
                fail_times: 99,
                calls: Arc::clone(&calls),
            },
            quick_retry(),
        );
        let d = Dispatcher::new(registry);
        let out = d.execute_one(&mcall("1", "read_file", "{}")).await;
        assert!(out.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retries after non-retryable");
    }

    #[tokio::test]
    async fn unmatched_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            FlakyTool {
                name: "grep",
                error: "segfault of some kind",
                fail_times: 99,
                calls: Arc::clone(&calls),
            },
            quick_retry(),
        );
        let d = Dispatcher::new(registry);
        let out = d.execute_one(&mcall("1", "grep", "{}")).await;
        assert!(out.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_exhausted_reports_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            FlakyTool {
                name: "web_fetch",
                error: "timeout talking to server",
                fail_times: 99,
                calls: Arc::clone(&calls),
            },
            quick_retry(),
        );
        let d = Dispatcher::new(registry);
        let out = d.execute_one(&mcall("1", "web_fetch", "{}")).await;
        assert!(out.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial + 2 retries");
    }

    // ── Failure strategies ────────────────────────────────────────────────────

    #[tokio::test]
    async fn skip_strategy_synthesizes_success() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            AlwaysFails {
                name: "web_search",
                error: "flaky backend",
            },
            ToolConfig::new(Default::default(), FailureStrategy::Skip)
                .with_retries(0, Duration::from_millis(1)),
        );
        let d = Dispatcher::new(registry);
        let out = d.execute_one(&mcall("1", "web_search", "{}")).await;
        assert!(!out.is_error);
        assert!(out.content.contains("skipped due to failure"));
    }

    #[tokio::test]
    async fn fallback_strategy_returns_canned_sentinel() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            AlwaysFails {
                name: "grep",
                error: "engine exploded",
            },
            ToolConfig::new(Default::default(), FailureStrategy::Fallback)
                .with_retries(0, Duration::from_millis(1)),
        );
        let d = Dispatcher::new(registry);
        let out = d.execute_one(&mcall("1", "grep", "{}")).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "(no matches)");
    }

    #[test]
    fn fallback_sentinels_per_tool() {
        assert_eq!(fallback_output("glob"), "(no matches)");
        assert_eq!(fallback_output("web_search"), "(no results)");
        assert!(fallback_output("web_fetch").contains("unavailable"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_plain_failure() {
        let d = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let out = d.execute_one(&mcall("1", "ghost", "{}")).await;
        assert!(out.is_error);
        assert!(out.content.contains("Tool not found"));
    }

    // ── Plan mode & sub-agent restriction ─────────────────────────────────────

    #[tokio::test]
    async fn plan_mode_rejects_write_tools() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            NamedEcho {
                name: "write_file",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        let d = Dispatcher::new(registry);
        d.set_plan_mode(true);
        let out = d.execute_one(&mcall("1", "write_file", "{}")).await;
        assert!(out.is_error);
        assert!(out.content.contains("plan mode"));
    }

    #[tokio::test]
    async fn plan_mode_allows_read_tools() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            NamedEcho {
                name: "read_file",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        let d = Dispatcher::new(registry);
        d.set_plan_mode(true);
        let out = d.execute_one(&mcall("1", "read_file", "{}")).await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn read_only_dispatcher_bans_mutating_tools() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            NamedEcho {
                name: "edit_file",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        registry.register(
            NamedEcho {
                name: "bash",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        let d = Dispatcher::read_only(registry);
        let denied = d.execute_one(&mcall("1", "edit_file", "{}")).await;
        assert!(denied.is_error);
        assert!(denied.content.contains("not available to this sub-agent"));
        // bash is not in the sub-agent ban set
        let allowed = d.execute_one(&mcall("2", "bash", "{}")).await;
        assert!(!allowed.is_error);
    }

    // ── Validation, batching, grouping ────────────────────────────────────────

    #[tokio::test]
    async fn validate_rejects_unknown_tool_and_bad_json() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(NamedEcho { name: "grep", delay_ms: 0 }, ToolConfig::default());
        let d = Dispatcher::new(registry);
        assert!(d.validate_tool_call(&mcall("1", "grep", "{}")).is_ok());
        assert!(d.validate_tool_call(&mcall("1", "grep", "")).is_ok());
        assert!(d.validate_tool_call(&mcall("1", "nope", "{}")).is_err());
        assert!(d.validate_tool_call(&mcall("1", "grep", "{broken")).is_err());
    }

    #[tokio::test]
    async fn execute_batch_stops_between_batches_when_cancelled() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(NamedEcho { name: "grep", delay_ms: 0 }, ToolConfig::default());
        let d = Dispatcher::new(registry);
        let cancel = CancelToken::new();
        cancel.cancel();
        let batches = vec![vec![mcall("1", "grep", "{}")]];
        let results = d.execute_batch(&cancel, &batches).await;
        assert!(results.is_empty(), "cancelled before the first batch");
    }

    #[test]
    fn group_for_parallel_splits_reads_and_writes() {
        let d = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let calls = vec![
            mcall("1", "read_file", "{}"),
            mcall("2", "write_file", "{}"),
            mcall("3", "grep", "{}"),
            mcall("4", "bash", "{}"),
        ];
        let batches = d.group_for_parallel(&calls);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2, "all read-only calls in one batch");
        assert_eq!(batches[0][0].id, "1");
        assert_eq!(batches[0][1].id, "3");
        assert_eq!(batches[1][0].id, "2");
        assert_eq!(batches[2][0].id, "4");
    }

    // ── Write log ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn successful_writes_are_logged_with_path() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            NamedEcho {
                name: "write_file",
                delay_ms: 0,
            },
            ToolConfig::default(),
        );
        let d = Dispatcher::new(registry);
        d.execute_one(&mcall("1", "write_file", r#"{"path":"/tmp/a.txt","content":"x"}"#))
            .await;
        assert_eq!(d.written_paths(), vec!["/tmp/a.txt".to_string()]);
    }
}
