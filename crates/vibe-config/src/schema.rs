// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) | "mock"
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies, LiteLLM, or Ollama.
    pub base_url: Option<String>,
    /// Base max_tokens for a completion.  The agent halves this as iterations
    /// deepen to pressure the model toward convergence.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
    /// Context window in tokens.  Drives the session compaction trigger.
    pub context_window: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(8192),
            temperature: Some(0.2),
            context_window: Some(128_000),
        }
    }
}

impl ModelConfig {
    /// Resolve the API key: explicit value wins, then `api_key_env`, then the
    /// provider's canonical environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.clone());
        }
        if let Some(env) = &self.api_key_env {
            if let Ok(v) = std::env::var(env) {
                return Some(v);
            }
        }
        match self.provider.as_str() {
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        }
    }
}

fn default_max_iterations() -> u32 {
    50
}
fn default_sub_agent_timeout_secs() -> u64 {
    300
}
fn default_orchestrator_timeout_secs() -> u64 {
    600
}
fn default_auto_test_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model round-trips inside a single `run` before the loop
    /// terminates with an Exhausted status.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Start in plan mode: write-classified tools are hidden from the model
    /// and rejected by the dispatcher.
    #[serde(default)]
    pub plan_mode: bool,
    /// Run a syntax check after every write to a script file and feed
    /// failures back to the model.
    #[serde(default)]
    pub auto_test: bool,
    /// Wall-clock limit for one auto-test run.
    #[serde(default = "default_auto_test_timeout_secs")]
    pub auto_test_timeout_secs: u64,
    /// Wall-clock limit for one sub-agent run.
    #[serde(default = "default_sub_agent_timeout_secs")]
    pub sub_agent_timeout_secs: u64,
    /// Combined wall-clock limit for a parallel sub-agent batch.
    #[serde(default = "default_orchestrator_timeout_secs")]
    pub orchestrator_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            plan_mode: false,
            auto_test: false,
            auto_test_timeout_secs: default_auto_test_timeout_secs(),
            sub_agent_timeout_secs: default_sub_agent_timeout_secs(),
            orchestrator_timeout_secs: default_orchestrator_timeout_secs(),
        }
    }
}

fn default_bash_timeout_secs() -> u64 {
    120
}
fn default_bash_max_timeout_secs() -> u64 {
    600
}
fn default_web_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default bash command timeout in seconds.
    #[serde(default = "default_bash_timeout_secs")]
    pub bash_timeout_secs: u64,
    /// Hard ceiling for a caller-supplied bash timeout.
    #[serde(default = "default_bash_max_timeout_secs")]
    pub bash_max_timeout_secs: u64,
    /// Divert write_file/edit_file mutations into the staging sandbox so
    /// changes can be reviewed before committing.
    #[serde(default)]
    pub sandbox: bool,
    /// Timeout for a single web_fetch request.
    #[serde(default = "default_web_fetch_timeout_secs")]
    pub web_fetch_timeout_secs: u64,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bash_timeout_secs: default_bash_timeout_secs(),
            bash_max_timeout_secs: default_bash_max_timeout_secs(),
            sandbox: false,
            web_fetch_timeout_secs: default_web_fetch_timeout_secs(),
            watcher: WatcherConfig::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Glob patterns to watch; empty disables the watcher.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base directory for persisted sessions.
    /// Defaults to `<data_dir>/vibe` when unset.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vibe")
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
