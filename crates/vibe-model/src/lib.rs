// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod normalize;
mod mock;
mod openai;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedProvider};
pub use normalize::normalize_arguments;
pub use openai::OpenAiProvider;
pub use provider::ModelProvider;
pub use types::*;

use anyhow::bail;
use vibe_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// Selects the driver implementation based on `cfg.provider`.  The "openai"
/// driver speaks the OpenAI-compatible chat completion wire format and works
/// against any endpoint that implements it (local proxies, Ollama, LiteLLM).
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(
            cfg.name.clone(),
            cfg.resolve_api_key(),
            cfg.base_url.clone(),
            cfg.temperature,
        ))),
        "mock" => Ok(Box::new(MockProvider)),
        other => bail!("unknown model provider: {other}"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
