// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent;
pub mod autotest;
pub mod cancel;
pub mod dispatcher;
pub mod events;
pub mod loop_detector;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod subagent;
pub mod watcher;

pub use agent::{Agent, RunOutcome, RunStatus};
pub use autotest::AutoTester;
pub use cancel::CancelToken;
pub use dispatcher::Dispatcher;
pub use events::AgentEvent;
pub use loop_detector::{LoopDetector, LoopInfo, ToolCallRecord};
pub use orchestrator::Orchestrator;
pub use session::{CompactionResult, Session, Summarizer, TallySummarizer};
pub use store::{SessionIndexEntry, SessionStore};
pub use subagent::{SubAgent, SubAgentResult, SubAgentSpec};
pub use watcher::{render_change_notification, FileEvent, FileEventKind, FileWatcher, WatcherHandle};
