// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vibe",
    version,
    about = "A local terminal-driven AI coding agent"
)]
pub struct Cli {
    /// One-shot prompt; omit for an interactive chat session.
    #[arg(short = 'p', long = "prompt")]
    pub prompt: Option<String>,

    /// Start in plan mode: write tools are hidden from the model and
    /// rejected by the dispatcher.
    #[arg(long)]
    pub plan: bool,

    /// Divert write/edit tools into the staging sandbox for review.
    #[arg(long)]
    pub sandbox: bool,

    /// Resume a saved session by id (see `vibe sessions list`).
    #[arg(long)]
    pub resume: Option<String>,

    /// Path to an explicit config file (merged last).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (or set VIBE_LOG).
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage saved sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Print the merged configuration and exit.
    ShowConfig,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List saved sessions for this project, most recent first.
    List,
    /// Delete a saved session.
    Delete {
        /// Session id to delete.
        id: String,
    },
}
