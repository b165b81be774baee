// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, SessionCommands};
use vibe_config::Config;
use vibe_core::{
    render_change_notification, Agent, CancelToken, FileWatcher, Orchestrator, RunStatus, Session,
    SessionStore,
};
use vibe_model::ModelProvider;
use vibe_tools::{
    BashTool, EditFileTool, FailureStrategy, GlobTool, GrepTool, NotebookEditTool,
    ParallelAgentsTool, ReadFileTool, Sandbox, ToolCategory, ToolConfig, ToolRegistry,
    WebFetchTool, WebSearchTool, WriteFileTool,
};

const SYSTEM_PROMPT: &str = "\
You are vibe, a coding agent running in the user's terminal.\n\
Work step by step: inspect the project with the read-only tools before \
changing anything, make edits with write_file/edit_file, and verify your \
work with bash. When the task is done, reply with a concise summary and no \
further tool calls.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = vibe_config::load(cli.config.as_deref())?;
    if cli.plan {
        config.agent.plan_mode = true;
    }

    let project_root = std::env::current_dir().context("resolving working directory")?;
    let store = SessionStore::new(config.session.resolved_base_dir(), &project_root);

    if let Some(cmd) = &cli.command {
        return match cmd {
            Commands::ShowConfig => {
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                Ok(())
            }
            Commands::Sessions { command } => run_sessions_command(&store, command),
        };
    }

    let outcome = run_agent(&cli, config, project_root, store).await;
    // Background bash tasks must not outlive the process.
    vibe_tools::tasks::global().kill_all();
    outcome
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("VIBE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_sessions_command(store: &SessionStore, command: &SessionCommands) -> anyhow::Result<()> {
    match command {
        SessionCommands::List => {
            let rows = store.list();
            if rows.is_empty() {
                println!("no saved sessions for this project");
            }
            for row in rows {
                println!("{}  {}", row.session_id, row.last_active.to_rfc3339());
            }
            Ok(())
        }
        SessionCommands::Delete { id } => {
            store.delete(id)?;
            println!("deleted session {id}");
            Ok(())
        }
    }
}

async fn run_agent(
    cli: &Cli,
    config: Config,
    project_root: PathBuf,
    store: SessionStore,
) -> anyhow::Result<()> {
    let provider: Arc<dyn ModelProvider> = Arc::from(vibe_model::from_config(&config.model)?);

    let sandbox = Arc::new(Sandbox::new(&project_root));
    sandbox.set_enabled(cli.sandbox || config.tools.sandbox);

    let (registry, write_tool) = build_registry(&config, Arc::clone(&sandbox));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&provider),
        Arc::clone(&registry),
        &config,
    ));
    registry.register(
        ParallelAgentsTool::new(orchestrator),
        ToolConfig::new(ToolCategory::Enhancing, FailureStrategy::Fatal),
    );

    let session = match &cli.resume {
        Some(id) => Arc::new(store.load(id).with_context(|| format!("resuming session {id}"))?),
        None => Arc::new(Session::new(
            SYSTEM_PROMPT,
            config.model.context_window.unwrap_or(128_000) as usize,
        )),
    };

    // Optional change watcher: batches become user-visible session messages.
    let watcher_handle = if config.tools.watcher.patterns.is_empty() {
        None
    } else {
        let watcher = FileWatcher::new(&project_root, &config.tools.watcher.patterns)
            .with_intervals(
                std::time::Duration::from_millis(config.tools.watcher.poll_interval_ms),
                std::time::Duration::from_millis(config.tools.watcher.debounce_ms),
            );
        let (mut rx, handle) = watcher.start();
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                session.add_user(render_change_notification(&batch));
            }
        });
        Some(handle)
    };

    let cancel = CancelToken::new();
    let mut agent = Agent::new(provider, registry, Arc::clone(&session), &config)
        .with_cancel(cancel.clone());

    // Ctrl-C cancels the current run instead of killing the process.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = match &cli.prompt {
        Some(goal) => {
            let outcome = agent.run(goal).await;
            print_outcome(&outcome);
            store.save(&session)?;
            Ok(())
        }
        None => interactive_loop(&mut agent, &store, &session, &sandbox, &write_tool).await,
    };

    if let Some(handle) = watcher_handle {
        handle.stop();
    }
    result
}

async fn interactive_loop(
    agent: &mut Agent,
    store: &SessionStore,
    session: &Arc<Session>,
    sandbox: &Arc<Sandbox>,
    write_tool: &Arc<WriteFileTool>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("vibe interactive session {} (exit with 'quit')", session.id());

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "/staged" => {
                for staged in sandbox.list_staged() {
                    println!("staged: {}", staged.relative_path);
                }
                continue;
            }
            "/commit" => {
                match sandbox.commit() {
                    Ok(paths) => println!("committed: {}", paths.join(", ")),
                    Err(e) => eprintln!("commit failed: {e}"),
                }
                continue;
            }
            "/discard" => {
                sandbox.discard();
                println!("discarded all staged changes");
                continue;
            }
            "/undo" => {
                match write_tool.undo() {
                    Some(what) => println!("undo: {what}"),
                    None => println!("nothing to undo"),
                }
                continue;
            }
            goal => {
                let outcome = agent.run(goal).await;
                print_outcome(&outcome);
                store.save(session)?;
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &vibe_core::RunOutcome) {
    if !outcome.final_text.is_empty() {
        println!("{}", outcome.final_text);
    }
    match outcome.status {
        RunStatus::Completed => {}
        status => eprintln!(
            "[run ended: {status:?} after {} iteration(s) — {}]",
            outcome.iterations, outcome.explanation
        ),
    }
}

fn build_registry(
    config: &Config,
    sandbox: Arc<Sandbox>,
) -> (Arc<ToolRegistry>, Arc<WriteFileTool>) {
    let registry = Arc::new(ToolRegistry::new());
    let write_tool = Arc::new(WriteFileTool::new(Arc::clone(&sandbox)));
    registry.register(
        ReadFileTool,
        ToolConfig::new(ToolCategory::Essential, FailureStrategy::Retry),
    );
    registry.register(
        Arc::clone(&write_tool),
        ToolConfig::new(ToolCategory::Essential, FailureStrategy::Fatal),
    );
    registry.register(
        EditFileTool::new(Arc::clone(&sandbox)),
        ToolConfig::new(ToolCategory::Essential, FailureStrategy::Fatal),
    );
    registry.register(
        BashTool {
            default_timeout_secs: config.tools.bash_timeout_secs,
            max_timeout_secs: config.tools.bash_max_timeout_secs,
        },
        ToolConfig::new(ToolCategory::Essential, FailureStrategy::Fatal),
    );
    registry.register(
        GlobTool,
        ToolConfig::new(ToolCategory::Optional, FailureStrategy::Fallback),
    );
    registry.register(
        GrepTool,
        ToolConfig::new(ToolCategory::Optional, FailureStrategy::Fallback),
    );
    registry.register(
        WebFetchTool {
            timeout_secs: config.tools.web_fetch_timeout_secs,
        },
        ToolConfig::new(ToolCategory::Enhancing, FailureStrategy::Retry),
    );
    registry.register(
        WebSearchTool::default(),
        ToolConfig::new(ToolCategory::Enhancing, FailureStrategy::Fallback),
    );
    registry.register(
        NotebookEditTool,
        ToolConfig::new(ToolCategory::Optional, FailureStrategy::Retry),
    );
    (registry, write_tool)
}
