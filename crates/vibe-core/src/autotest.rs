// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// File extensions treated as scripts worth a syntax check after a write.
pub const SCRIPT_EXTENSIONS: &[&str] = &["py", "sh", "bash", "js", "mjs"];

#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub success: bool,
    pub output: String,
}

/// Runs a cheap per-file syntax check after the agent writes a script, so a
/// broken file is reported back into the conversation immediately instead of
/// failing later at runtime.
pub struct AutoTester {
    pub timeout: Duration,
}

impl Default for AutoTester {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

impl AutoTester {
    pub fn is_script_path(path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SCRIPT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Check one file; `None` when no checker applies to its extension.
    pub async fn run_for(&self, path: &str) -> Option<TestOutcome> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        let command = match ext.as_str() {
            "py" => format!("python3 -m py_compile '{path}'"),
            "sh" | "bash" => format!("bash -n '{path}'"),
            "js" | "mjs" => format!("node --check '{path}'"),
            _ => return None,
        };
        debug!(path = %path, cmd = %command, "auto-test");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, cmd.output()).await;
        let outcome = match result {
            Ok(Ok(output)) => TestOutcome {
                success: output.status.success(),
                output: format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            },
            Ok(Err(e)) => TestOutcome {
                success: false,
                output: format!("auto-test spawn error: {e}"),
            },
            Err(_) => TestOutcome {
                success: false,
                output: format!("auto-test timeout after {}s", self.timeout.as_secs()),
            },
        };
        Some(outcome)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_extensions_are_recognized() {
        assert!(AutoTester::is_script_path("/tmp/x.py"));
        assert!(AutoTester::is_script_path("deploy.sh"));
        assert!(AutoTester::is_script_path("app.js"));
        assert!(!AutoTester::is_script_path("main.rs"));
        assert!(!AutoTester::is_script_path("README.md"));
        assert!(!AutoTester::is_script_path("no_extension"));
    }

    #[tokio::test]
    async fn valid_shell_script_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.sh");
        std::fs::write(&path, "echo fine\n").unwrap();
        let outcome = AutoTester::default()
            .run_for(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(outcome.success, "{}", outcome.output);
    }

    #[tokio::test]
    async fn broken_shell_script_fails_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.sh");
        std::fs::write(&path, "if then fi done\n").unwrap();
        let outcome = AutoTester::default()
            .run_for(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(!outcome.output.is_empty());
    }

    #[tokio::test]
    async fn unknown_extension_returns_none() {
        assert!(AutoTester::default().run_for("/tmp/data.csv").await.is_none());
    }
}
