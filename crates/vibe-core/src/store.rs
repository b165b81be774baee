// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::session::Session;

/// Per-session file size cap.
const MAX_SESSION_FILE_BYTES: usize = 50 * 1024 * 1024;

/// One row in the session index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub project_hash: String,
    pub session_id: String,
    pub last_active: DateTime<Utc>,
}

/// Persists sessions as JSONL files under a base directory:
///
/// ```text
/// <base>/sessions/<session_id>.jsonl
/// <base>/session_index.json
/// ```
///
/// All writes are atomic (temp + rename) so a crash never leaves a
/// half-written session on disk.
pub struct SessionStore {
    base: PathBuf,
    project_hash: String,
}

impl SessionStore {
    pub fn new(base: impl Into<PathBuf>, project_root: &Path) -> Self {
        Self {
            base: base.into(),
            project_hash: project_hash(project_root),
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{id}.jsonl"))
    }

    fn index_path(&self) -> PathBuf {
        self.base.join("session_index.json")
    }

    /// Save a session and update the index.
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        let text = session.to_jsonl();
        if text.len() > MAX_SESSION_FILE_BYTES {
            anyhow::bail!(
                "session {} too large to persist: {} bytes (cap {})",
                session.id(),
                text.len(),
                MAX_SESSION_FILE_BYTES
            );
        }
        std::fs::create_dir_all(self.sessions_dir()).context("creating sessions dir")?;
        let path = self.session_path(session.id());
        vibe_tools::sandbox::atomic_write(&path, text.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(id = %session.id(), path = %path.display(), "session saved");

        self.update_index(session.id())?;
        Ok(())
    }

    /// Load a previously saved session by ID.
    pub fn load(&self, id: &str) -> anyhow::Result<Session> {
        let path = self.session_path(id);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Session::from_jsonl(&text)
    }

    /// Delete a session file and its index row.
    pub fn delete(&self, id: &str) -> anyhow::Result<()> {
        let path = self.session_path(id);
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        }
        let mut index = self.read_index();
        index.retain(|e| e.session_id != id);
        self.write_index(&index)?;
        Ok(())
    }

    /// Index rows for this store's project, most recent first.
    pub fn list(&self) -> Vec<SessionIndexEntry> {
        let mut rows: Vec<SessionIndexEntry> = self
            .read_index()
            .into_iter()
            .filter(|e| e.project_hash == self.project_hash)
            .collect();
        rows.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        rows
    }

    fn update_index(&self, session_id: &str) -> anyhow::Result<()> {
        let mut index = self.read_index();
        match index
            .iter_mut()
            .find(|e| e.session_id == session_id && e.project_hash == self.project_hash)
        {
            Some(row) => row.last_active = Utc::now(),
            None => index.push(SessionIndexEntry {
                project_hash: self.project_hash.clone(),
                session_id: session_id.to_string(),
                last_active: Utc::now(),
            }),
        }
        self.write_index(&index)
    }

    fn read_index(&self) -> Vec<SessionIndexEntry> {
        std::fs::read_to_string(self.index_path())
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn write_index(&self, index: &[SessionIndexEntry]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.base).context("creating store base dir")?;
        let text = serde_json::to_string_pretty(index)?;
        vibe_tools::sandbox::atomic_write(&self.index_path(), text.as_bytes())
            .context("writing session index")?;
        Ok(())
    }
}

/// Hex SHA-256 of the project root path, used to scope the shared index.
fn project_hash(project_root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_root.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
