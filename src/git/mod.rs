//! External command execution boundary.
//!
//! The sync engine never talks to git directly; everything goes through
//! the `CommandRunner` trait so tests can script outcomes. All command
//! results are data: a failed spawn or a non-zero exit becomes
//! `CommandOutput { success: false, .. }`, never an `Err`. Git semantics
//! are inferred by scanning stdout/stderr text, not exit codes.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Outcome of one external command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful invocation with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation with the given stderr.
    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout and stderr concatenated, for error surfacing.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }

    /// Case-insensitive substring scan across stdout and stderr.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.stdout.to_ascii_lowercase().contains(&needle)
            || self.stderr.to_ascii_lowercase().contains(&needle)
    }
}

/// Executes a named external tool in a working directory.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, tool: &str, args: &[&str], cwd: &Path) -> CommandOutput;
}

/// Real command runner backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

#[async_trait]
impl CommandRunner for GitCli {
    async fn run(&self, tool: &str, args: &[&str], cwd: &Path) -> CommandOutput {
        tracing::debug!(tool, ?args, cwd = %cwd.display(), "running command");
        let result = Command::new(tool)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) => CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => CommandOutput::failed(format!("failed to launch {tool}: {e}")),
        }
    }
}

/// One entry from `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Two-character XY status code.
    pub code: String,
    /// Path of the change; for renames, the new name.
    pub path: String,
}

impl StatusEntry {
    #[must_use]
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Parse `git status --porcelain` output.
///
/// Rename entries (`R  old -> new`) keep the new name.
#[must_use]
pub fn parse_porcelain(output: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let code = line[..2].to_string();
        let rest = &line[3..];
        let path = rest
            .rsplit_once(" -> ")
            .map_or(rest, |(_, new_name)| new_name);
        let path = path.trim().trim_matches('"');
        if path.is_empty() {
            continue;
        }
        entries.push(StatusEntry {
            code,
            path: path.to_string(),
        });
    }
    entries
}

/// Whether a repo-relative path lies under the given directory prefix.
#[must_use]
pub fn path_is_under(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    path == dir || path.starts_with(&format!("{dir}/"))
}
