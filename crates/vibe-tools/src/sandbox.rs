// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Staging sandbox: a write-through layer that diverts mutations to a shadow
//! directory so a user may review diffs before any real change is committed.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;

use similar::TextDiff;
use tracing::debug;

/// Name of the shadow directory created under the project root.
pub const SHADOW_DIR_NAME: &str = ".vibe-sandbox";

/// Files longer than this get a summary line instead of a full diff.
const DIFF_LINE_LIMIT: usize = 200;

/// A pending change: the shadow copy of one project file.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub original_path: PathBuf,
    pub shadow_path: PathBuf,
    pub relative_path: String,
    /// Set exactly iff the original path did not exist at stage time.
    pub is_new: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path escapes the project root: {0}")]
    PathEscape(PathBuf),
    #[error("path is inside the sandbox shadow tree: {0}")]
    ShadowReentry(PathBuf),
    #[error("no staged file for {0}")]
    NotStaged(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Returned when a commit aborts partway: the files already written plus the
/// failure that stopped the remainder.
#[derive(Debug, thiserror::Error)]
#[error("commit failed for {path}: {source} ({committed_count} file(s) already committed)", committed_count = committed.len())]
pub struct CommitError {
    pub committed: Vec<String>,
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

pub struct Sandbox {
    project_root: PathBuf,
    shadow_root: PathBuf,
    enabled: AtomicBool,
    staged: RwLock<HashMap<String, StagedFile>>,
}

impl Sandbox {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = normalize_path(&project_root.into());
        let shadow_root = project_root.join(SHADOW_DIR_NAME);
        Self {
            project_root,
            shadow_root,
            enabled: AtomicBool::new(false),
            staged: RwLock::new(HashMap::new()),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn shadow_root(&self) -> &Path {
        &self.shadow_root
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Stage `bytes` as the pending content of `original`.
    ///
    /// Rejects paths that escape the project root or re-enter the shadow
    /// tree.  The shadow copy is written atomically (temp + rename) and the
    /// staged map updated; re-staging the same relative path overwrites the
    /// previous shadow content but keeps the original `is_new` flag.
    pub fn stage(&self, original: &Path, bytes: &[u8]) -> Result<StagedFile, SandboxError> {
        let abs = if original.is_absolute() {
            normalize_path(original)
        } else {
            normalize_path(&self.project_root.join(original))
        };

        if abs.starts_with(&self.shadow_root) {
            return Err(SandboxError::ShadowReentry(abs));
        }
        let rel = abs
            .strip_prefix(&self.project_root)
            .map_err(|_| SandboxError::PathEscape(abs.clone()))?;
        if rel.as_os_str().is_empty() {
            return Err(SandboxError::PathEscape(abs));
        }
        let rel_str = rel.to_string_lossy().into_owned();

        let shadow_path = self.shadow_root.join(rel);
        if let Some(parent) = shadow_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(&shadow_path, bytes)?;

        let mut staged = self.staged.write().expect("sandbox lock poisoned");
        let is_new = match staged.get(&rel_str) {
            Some(prev) => prev.is_new,
            None => !abs.exists(),
        };
        let entry = StagedFile {
            original_path: abs,
            shadow_path,
            relative_path: rel_str.clone(),
            is_new,
        };
        debug!(path = %rel_str, is_new, "staged file");
        staged.insert(rel_str, entry.clone());
        Ok(entry)
    }

    /// Commit every staged file to its original path, in sorted path order.
    ///
    /// Failure of any single commit aborts the remainder; the error carries
    /// the relative paths already committed.
    pub fn commit(&self) -> Result<Vec<String>, CommitError> {
        let entries: Vec<StagedFile> = {
            let staged = self.staged.read().expect("sandbox lock poisoned");
            let mut v: Vec<StagedFile> = staged.values().cloned().collect();
            v.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
            v
        };

        let mut committed = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Err(e) = self.commit_entry(&entry) {
                return Err(CommitError {
                    committed,
                    path: entry.relative_path,
                    source: e,
                });
            }
            committed.push(entry.relative_path);
        }
        Ok(committed)
    }

    /// Commit a single staged file.
    pub fn commit_file(&self, rel: &str) -> Result<(), SandboxError> {
        let entry = {
            let staged = self.staged.read().expect("sandbox lock poisoned");
            staged
                .get(rel)
                .cloned()
                .ok_or_else(|| SandboxError::NotStaged(rel.to_string()))?
        };
        self.commit_entry(&entry)?;
        Ok(())
    }

    fn commit_entry(&self, entry: &StagedFile) -> std::io::Result<()> {
        let bytes = std::fs::read(&entry.shadow_path)?;
        if let Some(parent) = entry.original_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(&entry.original_path, &bytes)?;
        let _ = std::fs::remove_file(&entry.shadow_path);
        self.staged
            .write()
            .expect("sandbox lock poisoned")
            .remove(&entry.relative_path);
        debug!(path = %entry.relative_path, "committed staged file");
        Ok(())
    }

    /// Discard all staged files: delete the shadow copies, clear the map.
    pub fn discard(&self) {
        let mut staged = self.staged.write().expect("sandbox lock poisoned");
        for entry in staged.values() {
            let _ = std::fs::remove_file(&entry.shadow_path);
        }
        staged.clear();
    }

    /// Discard one staged file.
    pub fn discard_file(&self, rel: &str) -> Result<(), SandboxError> {
        let mut staged = self.staged.write().expect("sandbox lock poisoned");
        let entry = staged
            .remove(rel)
            .ok_or_else(|| SandboxError::NotStaged(rel.to_string()))?;
        let _ = std::fs::remove_file(&entry.shadow_path);
        Ok(())
    }

    /// Unified diff between the original file and its staged replacement.
    ///
    /// Files longer than 200 lines on either side get a one-line summary
    /// instead of a hunk listing.
    pub fn diff(&self, rel: &str) -> Result<String, SandboxError> {
        let entry = {
            let staged = self.staged.read().expect("sandbox lock poisoned");
            staged
                .get(rel)
                .cloned()
                .ok_or_else(|| SandboxError::NotStaged(rel.to_string()))?
        };
        let new_text = std::fs::read_to_string(&entry.shadow_path)?;
        let old_text = if entry.is_new {
            String::new()
        } else {
            std::fs::read_to_string(&entry.original_path).unwrap_or_default()
        };

        let old_lines = old_text.lines().count();
        let new_lines = new_text.lines().count();
        if old_lines > DIFF_LINE_LIMIT || new_lines > DIFF_LINE_LIMIT {
            return Ok(format!(
                "{rel}: {old_lines} -> {new_lines} lines (diff omitted for large file)"
            ));
        }

        let diff = TextDiff::from_lines(&old_text, &new_text);
        Ok(diff
            .unified_diff()
            .header(&format!("a/{rel}"), &format!("b/{rel}"))
            .to_string())
    }

    pub fn list_staged(&self) -> Vec<StagedFile> {
        let staged = self.staged.read().expect("sandbox lock poisoned");
        let mut v: Vec<StagedFile> = staged.values().cloned().collect();
        v.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        v
    }

    pub fn staged_count(&self) -> usize {
        self.staged.read().expect("sandbox lock poisoned").len()
    }

    /// Purge the entire shadow tree and clear the staged map.
    pub fn cleanup(&self) {
        self.staged.write().expect("sandbox lock poisoned").clear();
        let _ = std::fs::remove_dir_all(&self.shadow_root);
    }
}

/// Write `bytes` atomically: temp file in the target directory, then rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".into());
    let tmp = path.with_file_name(format!(
        ".{name}.tmp-{}-{n}",
        std::process::id()
    ));
    std::fs::write(&tmp, bytes)?;
    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem, so paths that do not exist yet can still be validated.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
