// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// One sub-agent task requested through the `parallel_agents` tool.
#[derive(Debug, Clone)]
pub struct AgentTask {
    pub description: String,
    pub allow_writes: bool,
}

/// The outcome of one sub-agent task.
#[derive(Debug, Clone)]
pub struct AgentTaskResult {
    pub id: String,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub turns: u32,
}

/// Capability for running sub-agent tasks.
///
/// The concrete implementation lives in the core crate (the orchestrator);
/// passing it in as a trait object at registration time keeps this crate
/// free of a dependency cycle with the agent loop.
#[async_trait]
pub trait ParallelExecutor: Send + Sync {
    async fn run_parallel(&self, tasks: Vec<AgentTask>) -> Vec<AgentTaskResult>;
}

pub struct ParallelAgentsTool {
    executor: Arc<dyn ParallelExecutor>,
}

impl ParallelAgentsTool {
    pub fn new(executor: Arc<dyn ParallelExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for ParallelAgentsTool {
    fn name(&self) -> &str {
        "parallel_agents"
    }

    fn description(&self) -> &str {
        "Spawn up to 4 independent sub-agents, each with its own session, to \
         work on focused tasks concurrently, and return their aggregated \
         outputs. Tasks beyond the limit are dropped. Set allow_writes=true \
         on a task only when that sub-agent must modify files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "description": "Sub-agent tasks to run concurrently (max 4)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {
                                "type": "string",
                                "description": "What the sub-agent should do"
                            },
                            "allow_writes": {
                                "type": "boolean",
                                "description": "Permit file mutations (default false)"
                            }
                        },
                        "required": ["description"]
                    }
                }
            },
            "required": ["tasks"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(raw_tasks) = call.args.get("tasks").and_then(|v| v.as_array()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'tasks'");
        };
        let tasks: Vec<AgentTask> = raw_tasks
            .iter()
            .filter_map(|t| {
                let description = t.get("description")?.as_str()?.to_string();
                let allow_writes = t
                    .get("allow_writes")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Some(AgentTask {
                    description,
                    allow_writes,
                })
            })
            .collect();
        if tasks.is_empty() {
            return ToolOutput::err(&call.id, "'tasks' must contain at least one description");
        }

        debug!(count = tasks.len(), "parallel_agents tool");
        let results = self.executor.run_parallel(tasks).await;

        let mut sections = Vec::with_capacity(results.len());
        let mut any_error = false;
        for r in &results {
            match &r.error {
                Some(e) => {
                    any_error = true;
                    sections.push(format!(
                        "[{}] FAILED after {} turn(s) in {:.1}s: {e}",
                        r.id,
                        r.turns,
                        r.duration.as_secs_f32()
                    ));
                }
                None => sections.push(format!(
                    "[{}] ({} turn(s), {:.1}s)\n{}",
                    r.id,
                    r.turns,
                    r.duration.as_secs_f32(),
                    r.output
                )),
            }
        }
        let text = sections.join("\n\n");
        if any_error && results.iter().all(|r| r.error.is_some()) {
            ToolOutput::err(&call.id, text)
        } else {
            ToolOutput::ok(&call.id, text)
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    struct FakeExecutor;

    #[async_trait]
    impl ParallelExecutor for FakeExecutor {
        async fn run_parallel(&self, tasks: Vec<AgentTask>) -> Vec<AgentTaskResult> {
            tasks
                .iter()
                .enumerate()
                .map(|(i, t)| AgentTaskResult {
                    id: format!("agent-{}", i + 1),
                    output: format!("done: {}", t.description),
                    error: None,
                    duration: Duration::from_millis(5),
                    turns: 1,
                })
                .collect()
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl ParallelExecutor for FailingExecutor {
        async fn run_parallel(&self, tasks: Vec<AgentTask>) -> Vec<AgentTaskResult> {
            tasks
                .iter()
                .enumerate()
                .map(|(i, _)| AgentTaskResult {
                    id: format!("agent-{}", i + 1),
                    output: String::new(),
                    error: Some("boom".into()),
                    duration: Duration::from_millis(5),
                    turns: 1,
                })
                .collect()
        }
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "p1".into(),
            name: "parallel_agents".into(),
            args,
        }
    }

    #[tokio::test]
    async fn aggregates_results_with_agent_ids() {
        let t = ParallelAgentsTool::new(Arc::new(FakeExecutor));
        let out = t
            .execute(&call(json!({"tasks": [
                {"description": "read the docs"},
                {"description": "list the files", "allow_writes": false}
            ]})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("[agent-1]"));
        assert!(out.content.contains("[agent-2]"));
        assert!(out.content.contains("done: read the docs"));
    }

    #[tokio::test]
    async fn missing_tasks_is_error() {
        let t = ParallelAgentsTool::new(Arc::new(FakeExecutor));
        let out = t.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'tasks'"));
    }

    #[tokio::test]
    async fn empty_tasks_is_error() {
        let t = ParallelAgentsTool::new(Arc::new(FakeExecutor));
        let out = t.execute(&call(json!({"tasks": []}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn all_tasks_failing_is_an_error_result() {
        let t = ParallelAgentsTool::new(Arc::new(FailingExecutor));
        let out = t
            .execute(&call(json!({"tasks": [{"description": "doomed"}]})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("FAILED"));
    }
}
