// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Polling file watcher with debounced change batches, plus the injector
//! that turns a batch into a user-visible session message.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use regex::Regex;
use tokio::sync::mpsc;
use tracing::debug;
use walkdir::WalkDir;

use crate::cancel::CancelToken;

/// Directory and file names skipped during scans.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "dist",
    "build",
    ".DS_Store",
    "Thumbs.db",
];

/// Bounded event channel: batches are dropped when the consumer lags.
pub const EVENT_CHANNEL_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

impl std::fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileEventKind::Created => write!(f, "created"),
            FileEventKind::Modified => write!(f, "modified"),
            FileEventKind::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub mod_time: SystemTime,
}

/// Handle returned by [`FileWatcher::start`]; stops the polling task.
pub struct WatcherHandle {
    cancel: CancelToken,
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

pub struct FileWatcher {
    root: PathBuf,
    patterns: Vec<Regex>,
    excludes: Vec<String>,
    poll_interval: Duration,
    debounce: Duration,
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>, patterns: &[String]) -> Self {
        Self {
            root: root.into(),
            patterns: patterns.iter().filter_map(|p| path_glob_to_regex(p)).collect(),
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            poll_interval: Duration::from_millis(500),
            debounce: Duration::from_millis(500),
        }
    }

    pub fn with_intervals(mut self, poll: Duration, debounce: Duration) -> Self {
        self.poll_interval = poll;
        self.debounce = debounce;
        self
    }

    /// Scan once, then poll in a background task.  Batches of events arrive
    /// on the returned channel after the debounce window closes; when the
    /// channel is full the batch is dropped.
    pub fn start(self) -> (mpsc::Receiver<Vec<FileEvent>>, WatcherHandle) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancelToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let handle = WatcherHandle {
            cancel: cancel.clone(),
            running: Arc::clone(&running),
        };

        tokio::spawn(async move {
            let mut mod_times = self.scan();
            let mut pending: Vec<FileEvent> = Vec::new();
            let mut last_change: Option<Instant> = None;

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                tokio::time::sleep(self.poll_interval).await;

                let current = self.scan();
                let events = diff_scans(&mod_times, &current);
                mod_times = current;
                if !events.is_empty() {
                    pending.extend(events);
                    last_change = Some(Instant::now());
                }

                let quiet = last_change
                    .map(|t| t.elapsed() >= self.debounce)
                    .unwrap_or(false);
                if quiet && !pending.is_empty() {
                    let batch = std::mem::take(&mut pending);
                    last_change = None;
                    if tx.try_send(batch).is_err() {
                        debug!("watcher consumer is slow; dropping event batch");
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
        });

        (rx, handle)
    }

    /// Enumerate matching files under the root with their mtimes.
    fn scan(&self) -> HashMap<PathBuf, SystemTime> {
        let mut map = HashMap::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if !self.patterns.iter().any(|re| re.is_match(&rel)) {
                continue;
            }
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            map.insert(entry.path().to_path_buf(), mtime);
        }
        map
    }

    fn is_excluded(&self, entry: &walkdir::DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|n| self.excludes.iter().any(|x| x == n))
            .unwrap_or(false)
    }
}

fn diff_scans(
    before: &HashMap<PathBuf, SystemTime>,
    after: &HashMap<PathBuf, SystemTime>,
) -> Vec<FileEvent> {
    let mut events = Vec::new();
    for (path, mtime) in after {
        match before.get(path) {
            None => events.push(FileEvent {
                path: path.clone(),
                kind: FileEventKind::Created,
                mod_time: *mtime,
            }),
            Some(old) if mtime > old => events.push(FileEvent {
                path: path.clone(),
                kind: FileEventKind::Modified,
                mod_time: *mtime,
            }),
            Some(_) => {}
        }
    }
    for (path, mtime) in before {
        if !after.contains_key(path) {
            events.push(FileEvent {
                path: path.clone(),
                kind: FileEventKind::Deleted,
                mod_time: *mtime,
            });
        }
    }
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

/// Convert a path glob to a regex: `**` crosses directory separators,
/// `*` stays within one component, `?` matches a single character.
fn path_glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // swallow a following separator so "src/**/x" matches "src/x"
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Injector ─────────────────────────────────────────────────────────────────

/// Lines of content previewed per changed file.
const PREVIEW_LINES: usize = 20;

/// Render a change batch as a single user-role message: header, one bullet
/// per file, short content previews, and a trailing instruction.
pub fn render_change_notification(events: &[FileEvent]) -> String {
    let mut out = String::from("Files changed on disk:\n");
    for ev in events {
        out.push_str(&format!("- {} ({})\n", ev.path.display(), ev.kind));
    }
    for ev in events {
        if ev.kind == FileEventKind::Deleted {
            continue;
        }
        if let Some(preview) = preview_file(&ev.path) {
            out.push_str(&format!("\n--- {} ---\n{preview}\n", ev.path.display()));
        }
    }
    out.push_str("\nConsider whether these changes affect the current task.");
    out
}

fn preview_file(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let sample = &bytes[..bytes.len().min(512)];
    if sample.contains(&0u8) {
        return Some(format!("(binary file, {} bytes)", bytes.len()));
    }
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let mut preview = lines
        .iter()
        .take(PREVIEW_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > PREVIEW_LINES {
        preview.push_str(&format!(
            "\n...[{} more lines truncated]",
            lines.len() - PREVIEW_LINES
        ));
    }
    Some(preview)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
