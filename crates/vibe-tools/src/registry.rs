// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema — mirrors vibe_model::ToolSchema but keeps the tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How important a tool is to the agent's operation.  Informational today;
/// the dispatcher's failure strategies carry the behavioral weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolCategory {
    Essential,
    #[default]
    Optional,
    Enhancing,
}

/// What the dispatcher does when a tool fails after its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureStrategy {
    /// Surface the error; the result is a failure.
    Fatal,
    /// Retry on retryable errors, report failure when retries are exhausted.
    #[default]
    Retry,
    /// Synthesize a success noting the tool was skipped.
    Skip,
    /// Synthesize a success with a per-tool canned output.
    Fallback,
}

/// Per-tool execution policy, fixed at registration time.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub category: ToolCategory,
    pub failure_strategy: FailureStrategy,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            category: ToolCategory::Optional,
            failure_strategy: FailureStrategy::Retry,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ToolConfig {
    pub fn new(category: ToolCategory, failure_strategy: FailureStrategy) -> Self {
        Self {
            category,
            failure_strategy,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }
}

struct Entry {
    tool: Arc<dyn Tool>,
    config: ToolConfig,
}

struct Inner {
    tools: HashMap<String, Entry>,
    /// Memoized schema snapshot; invalidated on every register.
    schema_cache: Option<Arc<Vec<ToolSchema>>>,
}

/// Central registry holding all available tools and their execution policy.
///
/// Readers share the lock; registration takes it exclusively and invalidates
/// the memoized schema snapshot.
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                tools: HashMap::new(),
                schema_cache: None,
            }),
        }
    }

    pub fn register(&self, tool: impl Tool + 'static, config: ToolConfig) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner
            .tools
            .insert(tool.name().to_string(), Entry { tool: Arc::new(tool), config });
        inner.schema_cache = None;
    }

    pub fn register_default(&self, tool: impl Tool + 'static) {
        self.register(tool, ToolConfig::default());
    }

    pub fn get(&self, name: &str) -> Option<(Arc<dyn Tool>, ToolConfig)> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .tools
            .get(name)
            .map(|e| (Arc::clone(&e.tool), e.config.clone()))
    }

    pub fn config(&self, name: &str) -> Option<ToolConfig> {
        self.get(name).map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut names: Vec<String> = inner.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Produce schemas for all registered tools, sorted by name.
    /// The snapshot is memoized until the next register.
    pub fn schemas(&self) -> Arc<Vec<ToolSchema>> {
        {
            let inner = self.inner.read().expect("registry lock poisoned");
            if let Some(cached) = &inner.schema_cache {
                return Arc::clone(cached);
            }
        }
        let mut inner = self.inner.write().expect("registry lock poisoned");
        // Another writer may have filled the cache between the locks.
        if let Some(cached) = &inner.schema_cache {
            return Arc::clone(cached);
        }
        let mut schemas: Vec<ToolSchema> = inner
            .tools
            .values()
            .map(|e| ToolSchema {
                name: e.tool.name().to_string(),
                description: e.tool.description().to_string(),
                parameters: e.tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        let snapshot = Arc::new(schemas);
        inner.schema_cache = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Execute a call directly, bypassing dispatcher policy.  Used by tests
    /// and by callers that manage retries themselves.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.get(&call.name) {
            Some((tool, _)) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("Tool not found: {}", call.name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
