// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process-wide table of background bash tasks.
//!
//! One of only two process-wide stores in the system (the other is the
//! module-level cleanup in main).  Entries are created by the bash tool when
//! `run_in_background` is set and killed on shutdown.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Hard cap on live background tasks; spawns beyond it fail synchronously.
pub const MAX_BACKGROUND_TASKS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("background task table is full ({0} tasks)")]
    TableFull(usize),
}

#[derive(Debug, Default, Clone)]
pub struct TaskState {
    pub finished: bool,
    pub exit_code: Option<i32>,
    pub output: String,
}

struct TaskEntry {
    handle: tokio::task::JoinHandle<()>,
    state: Arc<Mutex<TaskState>>,
}

pub struct BackgroundTasks {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    counter: AtomicU64,
    capacity: usize,
}

impl BackgroundTasks {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(1),
            capacity,
        }
    }

    /// Spawn `command` under the platform shell in the background.
    /// Returns the task ID, or fails synchronously when the table is full.
    pub fn spawn(&self, command: &str, timeout: Duration) -> Result<String, TaskError> {
        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        // Finished entries free their slot for new work.
        tasks.retain(|_, e| !e.state.lock().map(|s| s.finished).unwrap_or(true));
        if tasks.len() >= self.capacity {
            return Err(TaskError::TableFull(tasks.len()));
        }

        let id = format!("bash-{}", self.counter.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(Mutex::new(TaskState::default()));
        let task_state = Arc::clone(&state);
        let cmd_text = command.to_string();
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            let mut cmd = Command::new("bash");
            cmd.arg("-c").arg(&cmd_text);
            cmd.stdin(Stdio::null());
            cmd.kill_on_drop(true);
            let result = tokio::time::timeout(timeout, cmd.output()).await;
            let mut st = task_state.lock().expect("task state lock poisoned");
            st.finished = true;
            match result {
                Ok(Ok(output)) => {
                    st.exit_code = output.status.code();
                    st.output = format!(
                        "{}{}",
                        String::from_utf8_lossy(&output.stdout),
                        String::from_utf8_lossy(&output.stderr)
                    );
                }
                Ok(Err(e)) => st.output = format!("spawn error: {e}"),
                Err(_) => st.output = format!("timeout after {}s", timeout.as_secs()),
            }
            debug!(id = %task_id, "background task finished");
        });

        tasks.insert(id.clone(), TaskEntry { handle, state });
        Ok(id)
    }

    /// Snapshot of a task's state; `None` for unknown IDs.
    pub fn status(&self, id: &str) -> Option<TaskState> {
        let tasks = self.tasks.lock().expect("task table lock poisoned");
        tasks
            .get(id)
            .map(|e| e.state.lock().expect("task state lock poisoned").clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().expect("task table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every running task; kill_on_drop delivers SIGKILL to children.
    pub fn kill_all(&self) {
        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        for (id, entry) in tasks.drain() {
            entry.handle.abort();
            debug!(id = %id, "killed background task");
        }
    }
}

/// The process-wide task table used by the bash tool.
pub fn global() -> &'static BackgroundTasks {
    static TABLE: OnceLock<BackgroundTasks> = OnceLock::new();
    TABLE.get_or_init(|| BackgroundTasks::with_capacity(MAX_BACKGROUND_TASKS))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
