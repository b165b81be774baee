// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use vibe_config::Config;
use vibe_model::ModelProvider;
use vibe_tools::{AgentTask, AgentTaskResult, ParallelExecutor, ToolRegistry};

use crate::{
    cancel::CancelToken,
    subagent::{SubAgent, SubAgentResult, SubAgentSpec},
};

/// Hard cap on concurrently running sub-agents; extra tasks are truncated.
pub const MAX_PARALLEL_AGENTS: usize = 4;

/// Spawns up to [`MAX_PARALLEL_AGENTS`] sub-agents, aggregates their results
/// in task order, and flags files written by more than one agent.
pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    model: String,
    sub_agent_timeout: Duration,
    combined_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            registry,
            model: config.model.name.clone(),
            sub_agent_timeout: Duration::from_secs(config.agent.sub_agent_timeout_secs),
            combined_timeout: Duration::from_secs(config.agent.orchestrator_timeout_secs),
        }
    }

    /// Run the given tasks concurrently.  Returns `None` for an empty task
    /// list.  When the combined timeout expires, unfinished sub-agents are
    /// cancelled and the results of finished ones are retained.
    pub async fn run_parallel(
        &self,
        cancel: &CancelToken,
        tasks: Vec<AgentTask>,
    ) -> Option<Vec<SubAgentResult>> {
        if tasks.is_empty() {
            return None;
        }
        let mut tasks = tasks;
        if tasks.len() > MAX_PARALLEL_AGENTS {
            warn!(
                requested = tasks.len(),
                cap = MAX_PARALLEL_AGENTS,
                "truncating parallel agent tasks"
            );
            tasks.truncate(MAX_PARALLEL_AGENTS);
        }
        let count = tasks.len();
        let child = cancel.child();

        let results: Arc<Mutex<Vec<Option<SubAgentResult>>>> =
            Arc::new(Mutex::new(vec![None; count]));
        let writers: Arc<Mutex<HashMap<String, Vec<String>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut handles = Vec::with_capacity(count);
        for (i, task) in tasks.into_iter().enumerate() {
            let id = format!("agent-{}", i + 1);
            let mut spec = SubAgentSpec::new(id.clone(), task.description)
                .with_writes(task.allow_writes);
            spec.timeout = self.sub_agent_timeout;

            let provider = Arc::clone(&self.provider);
            let registry = Arc::clone(&self.registry);
            let model = self.model.clone();
            let token = child.clone();
            let results = Arc::clone(&results);
            let writers = Arc::clone(&writers);

            handles.push(tokio::spawn(async move {
                debug!(id = %id, "sub-agent starting");
                let mut sub_agent = SubAgent::new(spec, provider, registry, model);
                let result = sub_agent.run(&token).await;
                sub_agent.collect_written();
                {
                    let mut map = writers.lock().expect("writers lock poisoned");
                    for path in sub_agent.written_paths() {
                        map.entry(path.clone()).or_default().push(id.clone());
                    }
                }
                results.lock().expect("results lock poisoned")[i] = Some(result);
            }));
        }

        let joined =
            tokio::time::timeout(self.combined_timeout, join_all(handles.iter_mut())).await;
        if joined.is_err() {
            warn!("combined sub-agent timeout expired; cancelling stragglers");
            child.cancel();
            for handle in &handles {
                handle.abort();
            }
        }

        let collected = {
            let mut slots = results.lock().expect("results lock poisoned");
            slots
                .iter_mut()
                .enumerate()
                .map(|(i, slot)| {
                    slot.take().unwrap_or_else(|| SubAgentResult {
                        id: format!("agent-{}", i + 1),
                        output: String::new(),
                        error: Some("cancelled: combined timeout expired".into()),
                        duration: self.combined_timeout,
                        turns: 0,
                    })
                })
                .collect::<Vec<_>>()
        };
        let mut collected = collected;

        // Conflict detection: any file written by more than one agent gets a
        // warning appended to the last result.
        let conflicts: Vec<String> = {
            let map = writers.lock().expect("writers lock poisoned");
            let mut rows: Vec<String> = map
                .iter()
                .filter(|(_, agents)| agents.len() > 1)
                .map(|(path, agents)| {
                    let mut agents = agents.clone();
                    agents.sort();
                    format!("{path} written by {}", agents.join(", "))
                })
                .collect();
            rows.sort();
            rows
        };
        if !conflicts.is_empty() {
            if let Some(last) = collected.last_mut() {
                last.output.push_str(&format!(
                    "\n[warning] write conflicts detected: {}",
                    conflicts.join("; ")
                ));
            }
        }

        Some(collected)
    }
}

#[async_trait]
impl ParallelExecutor for Orchestrator {
    async fn run_parallel(&self, tasks: Vec<AgentTask>) -> Vec<AgentTaskResult> {
        let cancel = CancelToken::new();
        match Orchestrator::run_parallel(self, &cancel, tasks).await {
            Some(results) => results
                .into_iter()
                .map(|r| AgentTaskResult {
                    id: r.id,
                    output: r.output,
                    error: r.error,
                    duration: r.duration,
                    turns: r.turns,
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
