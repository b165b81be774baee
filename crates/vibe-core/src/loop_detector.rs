// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

/// Bounded trace length.
pub const HISTORY_SIZE: usize = 10;

/// Consecutive same-tool threshold.
pub const REPEAT_THRESHOLD: usize = 3;

/// One recorded tool call.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub argument_text: String,
    pub timestamp: DateTime<Utc>,
}

/// What tripped the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    pub tool_name: String,
    pub repeat_count: usize,
}

/// Bounded-history detector of runaway repeated tool calls.
///
/// The per-tool counter is cumulative over the whole run, not windowed by
/// the bounded history: a long session that keeps coming back to one tool
/// can trip the counter rule without a recent burst.  `clear_tool_count`
/// and `reset` are the escape hatches.
#[derive(Debug, Default)]
pub struct LoopDetector {
    history: VecDeque<ToolCallRecord>,
    counts: HashMap<String, usize>,
}

impl LoopDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest once the history is full.
    pub fn record(&mut self, name: &str, args: &str) {
        if self.history.len() >= HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(ToolCallRecord {
            tool_name: name.to_string(),
            argument_text: args.to_string(),
            timestamp: Utc::now(),
        });
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    /// True when any loop rule fires:
    /// (a) some cumulative counter reached the threshold;
    /// (b) the last two records are byte-identical;
    /// (c) the last three records show an A,B,A tool pattern;
    /// (d) the last `REPEAT_THRESHOLD` records share one tool name.
    pub fn detect_loop(&self) -> bool {
        if self.counts.values().any(|&c| c >= REPEAT_THRESHOLD) {
            return true;
        }
        let n = self.history.len();
        if n >= 2 {
            let a = &self.history[n - 1];
            let b = &self.history[n - 2];
            if a.tool_name == b.tool_name && a.argument_text == b.argument_text {
                return true;
            }
        }
        if n >= 3 && self.history[n - 1].tool_name == self.history[n - 3].tool_name {
            return true;
        }
        self.check_for_stuck_loop()
    }

    /// True iff the last `REPEAT_THRESHOLD` records exist and all share the
    /// same tool name.  `clear_tool_count` for that tool releases the stuck
    /// state even while the records remain in history.
    pub fn check_for_stuck_loop(&self) -> bool {
        let n = self.history.len();
        if n < REPEAT_THRESHOLD {
            return false;
        }
        let name = &self.history[n - 1].tool_name;
        if !self.counts.contains_key(name) {
            return false;
        }
        self.history
            .iter()
            .skip(n - REPEAT_THRESHOLD)
            .all(|r| &r.tool_name == name)
    }

    pub fn should_abort(&self) -> bool {
        self.check_for_stuck_loop()
    }

    /// Details of the detected loop, if any.
    pub fn loop_info(&self) -> Option<LoopInfo> {
        if !self.detect_loop() {
            return None;
        }
        // Trailing same-tool run length wins; fall back to the most-called
        // tool when the counter rule alone tripped.
        if let Some(last) = self.history.back() {
            let run = self
                .history
                .iter()
                .rev()
                .take_while(|r| r.tool_name == last.tool_name)
                .count();
            if run >= 2 {
                return Some(LoopInfo {
                    tool_name: last.tool_name.clone(),
                    repeat_count: self.counts.get(&last.tool_name).copied().unwrap_or(run),
                });
            }
        }
        self.most_called().map(|(name, count)| LoopInfo {
            tool_name: name,
            repeat_count: count,
        })
    }

    /// The most recent `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ToolCallRecord> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn tool_counts(&self) -> HashMap<String, usize> {
        self.counts.clone()
    }

    pub fn most_called(&self) -> Option<(String, usize)> {
        self.counts
            .iter()
            // Highest count wins; ties break toward the lexicographically
            // smaller name so the result is deterministic.
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, count)| (name.clone(), *count))
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.counts.clear();
    }

    pub fn clear_tool_count(&mut self, name: &str) {
        self.counts.remove(name);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
