// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse};

/// A model backend.  Implementations normalize provider quirks — in
/// particular, tool-call arguments in the returned [`CompletionResponse`]
/// must already be canonical JSON object text (see [`crate::normalize_arguments`]).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return the normalized response.
    ///
    /// Implementations must honor cancellation by returning promptly when the
    /// caller drops the future.
    async fn complete(&self, req: &CompletionRequest) -> anyhow::Result<CompletionResponse>;
}
