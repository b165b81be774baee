// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

const MAX_RESULTS_CEILING: usize = 30;
const DEFAULT_MAX_RESULTS: usize = 10;

/// Minimum delay between two queries within one session.
const MIN_QUERY_INTERVAL: Duration = Duration::from_secs(2);

/// Hard cap on queries per session.
const SESSION_QUERY_CAP: u32 = 50;

#[derive(Default)]
struct SearchState {
    last_query: Option<Instant>,
    session_count: u32,
}

/// Web search via the DuckDuckGo HTML endpoint.
///
/// No API key: results are scraped from the HTML response.  A minimum
/// inter-query interval and a per-session cap keep the endpoint happy.
pub struct WebSearchTool {
    state: Mutex<SearchState>,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self {
            state: Mutex::new(SearchState::default()),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (DuckDuckGo). Returns titles, URLs and snippets.\n\
         max_results caps the result count (default 10, max 30).\n\
         Queries are rate limited to one every 2 seconds, 50 per session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum results to return (default 10, max 30)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'query'"),
        };
        let max_results = call
            .args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_RESULTS as u64)
            .min(MAX_RESULTS_CEILING as u64) as usize;

        // Rate limiting: enforce the session cap, then the inter-query gap.
        {
            let mut state = self.state.lock().await;
            if state.session_count >= SESSION_QUERY_CAP {
                return ToolOutput::err(
                    &call.id,
                    format!("web_search session cap reached ({SESSION_QUERY_CAP} queries)"),
                );
            }
            state.session_count += 1;
            if let Some(last) = state.last_query {
                let since = last.elapsed();
                if since < MIN_QUERY_INTERVAL {
                    tokio::time::sleep(MIN_QUERY_INTERVAL - since).await;
                }
            }
            state.last_query = Some(Instant::now());
        }

        debug!(query = %query, max_results, "web_search tool");

        match search_duckduckgo(&query, max_results).await {
            Ok(results) if results.is_empty() => ToolOutput::ok(&call.id, "(no results)"),
            Ok(results) => {
                let text = results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolOutput::ok(&call.id, text)
            }
            Err(e) => ToolOutput::err(&call.id, format!("search error: {e}")),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

async fn search_duckduckgo(query: &str, max_results: usize) -> anyhow::Result<Vec<SearchResult>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent("Mozilla/5.0 (compatible; vibe-agent/0.3)")
        .build()?;
    let body = client
        .post("https://html.duckduckgo.com/html/")
        .form(&[("q", query)])
        .send()
        .await?
        .text()
        .await?;
    Ok(parse_results(&body, max_results))
}

/// Extract result links and snippets from the DuckDuckGo HTML page.
pub(crate) fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    // <a class="result__a" href="URL">TITLE</a> ... <a class="result__snippet" ...>SNIPPET</a>
    let link_re =
        Regex::new(r#"<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap();
    let snippet_re =
        Regex::new(r#"<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).unwrap();

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| strip_tags(&c[1]))
        .collect();

    link_re
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .map(|(i, c)| SearchResult {
            url: decode_entities(&c[1]),
            title: strip_tags(&c[2]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

fn strip_tags(s: &str) -> String {
    let re = Regex::new(r"<[^>]*>").unwrap();
    decode_entities(&re.replace_all(s, ""))
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .trim()
        .to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
