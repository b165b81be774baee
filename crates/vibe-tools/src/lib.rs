// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod registry;
pub mod sandbox;
pub mod tasks;
pub mod tool;

pub use registry::{FailureStrategy, ToolCategory, ToolConfig, ToolRegistry, ToolSchema};
pub use sandbox::{Sandbox, SandboxError, StagedFile};
pub use tool::{Tool, ToolCall, ToolOutput};

pub use builtin::bash::BashTool;
pub use builtin::edit_file::EditFileTool;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::notebook_edit::NotebookEditTool;
pub use builtin::parallel::{AgentTask, AgentTaskResult, ParallelAgentsTool, ParallelExecutor};
pub use builtin::read_file::ReadFileTool;
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::write_file::WriteFileTool;
