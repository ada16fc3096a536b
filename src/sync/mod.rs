//! Git synchronization engine.
//!
//! Orchestrates branch checks and the stash → fetch → fast-forward →
//! merge → commit → push protocol for a project's issue store. The engine
//! talks to git only through the `CommandRunner` boundary and infers git
//! semantics from output text, never from exit codes. Protocol outcomes
//! are returned as values (`BranchStatus`, `PullResult`, `SyncResult`
//! carrying a `SyncFailure`), not as `Err`.
//!
//! Operations on one project are serialized behind a per-project lock:
//! the working tree is a single mutable resource, so concurrent sync
//! attempts queue rather than interleave. Cancellation mid-protocol still
//! attempts stash restoration before unwinding.

use crate::config::FleeceConfig;
use crate::git::{CommandOutput, CommandRunner, StatusEntry, parse_porcelain, path_is_under};
use crate::merge::merge_issues;
use crate::model::{Issue, IssueId};
use crate::store::IssueStore;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Fixed commit message for issue-store sync commits.
pub const SYNC_COMMIT_MESSAGE: &str = "fleece: sync issue store";
/// Fixed commit message for issue-store merge commits.
pub const MERGE_COMMIT_MESSAGE: &str = "fleece: merge issue store";

const STASH_MESSAGE: &str = "fleece: pre-sync stash";

/// Why a sync/pull operation did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    /// Not on the expected branch; the user must switch.
    BranchMismatch { expected: String, actual: String },
    /// Uncommitted changes outside the issue-store path block the
    /// operation; the user must commit or discard them.
    NonFleeceChanges { files: Vec<String> },
    FetchFailed { detail: String },
    StashFailed { detail: String },
    /// Fatal: fast-forward was impossible, likely divergent history.
    FastForwardFailed { detail: String },
    /// The local or remote issue set could not be loaded for merging.
    MergeLoadFailed { detail: String },
    /// The merged issue set could not be written back.
    PersistFailed { detail: String },
    CommitFailed { detail: String },
    /// Push rejected for non-fast-forward reasons; pull first, then retry.
    PushRejected { detail: String },
    PushFailed { detail: String },
    /// A git invocation failed outside the cases above.
    CommandFailed { detail: String },
    Cancelled,
}

impl SyncFailure {
    /// Whether the user can resolve this without repository surgery.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BranchMismatch { .. }
                | Self::NonFleeceChanges { .. }
                | Self::PushRejected { .. }
                | Self::Cancelled
        )
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BranchMismatch { expected, actual } => write!(
                f,
                "on branch '{actual}' but expected '{expected}'; switch branches and retry"
            ),
            Self::NonFleeceChanges { files } => write!(
                f,
                "uncommitted changes outside the issue store block this operation \
                 (commit or discard first): {}",
                files.join(", ")
            ),
            Self::FetchFailed { detail } => write!(f, "fetch failed: {detail}"),
            Self::StashFailed { detail } => write!(f, "stash failed: {detail}"),
            Self::FastForwardFailed { detail } => write!(
                f,
                "fast-forward merge failed, histories may have diverged: {detail}"
            ),
            Self::MergeLoadFailed { detail } => {
                write!(f, "could not load issue set for merge: {detail}")
            }
            Self::PersistFailed { detail } => {
                write!(f, "could not persist merged issue set: {detail}")
            }
            Self::CommitFailed { detail } => write!(f, "commit failed: {detail}"),
            Self::PushRejected { detail } => write!(
                f,
                "push rejected, remote has commits you don't have; pull first: {detail}"
            ),
            Self::PushFailed { detail } => write!(f, "push failed: {detail}"),
            Self::CommandFailed { detail } => write!(f, "git command failed: {detail}"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

/// Ephemeral result of a branch status check.
#[derive(Debug, Clone, Default)]
pub struct BranchStatus {
    pub success: bool,
    pub is_on_correct_branch: bool,
    pub current_branch: String,
    pub ahead: usize,
    pub behind: usize,
    pub error: Option<String>,
}

impl BranchStatus {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Outcome of a pull operation.
#[derive(Debug, Clone, Default)]
pub struct PullResult {
    pub success: bool,
    pub issues_merged: usize,
    pub commits_pulled: usize,
    pub non_fleece_files: Vec<String>,
    pub failure: Option<SyncFailure>,
}

impl PullResult {
    #[must_use]
    fn fail(mut self, failure: SyncFailure) -> Self {
        if let SyncFailure::NonFleeceChanges { files } = &failure {
            self.non_fleece_files = files.clone();
        }
        self.success = false;
        self.failure = Some(failure);
        self
    }

    #[must_use]
    pub fn has_non_fleece_changes(&self) -> bool {
        !self.non_fleece_files.is_empty()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }
}

/// Outcome of a full sync (pull + commit + push).
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub success: bool,
    pub files_committed: usize,
    pub issues_merged: usize,
    pub commits_pulled: usize,
    pub pushed: bool,
    pub requires_pull_first: bool,
    pub non_fleece_files: Vec<String>,
    pub failure: Option<SyncFailure>,
}

impl SyncResult {
    #[must_use]
    fn fail(mut self, failure: SyncFailure) -> Self {
        self.requires_pull_first = matches!(failure, SyncFailure::PushRejected { .. });
        if let SyncFailure::NonFleeceChanges { files } = &failure {
            self.non_fleece_files = files.clone();
        }
        self.success = false;
        self.failure = Some(failure);
        self
    }

    #[must_use]
    pub fn has_non_fleece_changes(&self) -> bool {
        !self.non_fleece_files.is_empty()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }
}

/// Branch/sync orchestrator for issue-store repositories.
///
/// Operates directly against the store and the git working tree,
/// bypassing the cache; callers reload the cache afterwards.
pub struct SyncEngine {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn IssueStore>,
    remote: String,
    fleece_dir: String,
    locks: RwLock<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn IssueStore>,
        config: &FleeceConfig,
    ) -> Self {
        Self {
            runner,
            store,
            remote: config.remote.clone(),
            fleece_dir: config.fleece_dir.clone(),
            locks: RwLock::new(HashMap::new()),
        }
    }

    async fn git(&self, project: &Path, args: &[&str]) -> CommandOutput {
        self.runner.run("git", args, project).await
    }

    async fn project_lock(&self, project: &Path) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(project) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().await;
        Arc::clone(
            locks
                .entry(project.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Check whether the working copy is on `expected_branch` and how far
    /// it is ahead/behind the tracked remote branch.
    ///
    /// A branch mismatch is a non-fatal result (`success=true`,
    /// `is_on_correct_branch=false`): the caller resolves it by switching
    /// branches, not by error handling.
    pub async fn check_branch_status(
        &self,
        project: &Path,
        expected_branch: &str,
        cancel: &CancellationToken,
    ) -> BranchStatus {
        if cancel.is_cancelled() {
            return BranchStatus::failed(SyncFailure::Cancelled.to_string());
        }

        let head = self.git(project, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
        if !head.success {
            return BranchStatus::failed(head.combined());
        }
        let current = head.stdout.trim().to_string();

        if !current.eq_ignore_ascii_case(expected_branch) {
            return BranchStatus {
                success: true,
                is_on_correct_branch: false,
                current_branch: current,
                ..BranchStatus::default()
            };
        }

        let fetch = self.git(project, &["fetch", &self.remote, expected_branch]).await;
        if !fetch.success {
            return BranchStatus::failed(fetch.combined());
        }

        // One two-sided count: "ahead<TAB>behind" relative to the remote.
        let range = format!("HEAD...{}/{}", self.remote, expected_branch);
        let counts = self
            .git(project, &["rev-list", "--left-right", "--count", &range])
            .await;
        if !counts.success {
            return BranchStatus::failed(counts.combined());
        }
        let Some((ahead, behind)) = parse_ahead_behind(&counts.stdout) else {
            return BranchStatus::failed(format!(
                "unexpected rev-list output: {}",
                counts.stdout.trim()
            ));
        };

        BranchStatus {
            success: true,
            is_on_correct_branch: true,
            current_branch: current,
            ahead,
            behind,
            error: None,
        }
    }

    /// Pull remote changes while only the issue-store path is dirty.
    ///
    /// Blocks when changes exist outside the issue-store path: a
    /// mixed-content stash/pop cannot be split safely. Returns a
    /// zero-effect success when not behind the remote.
    pub async fn pull_fleece_only(
        &self,
        project: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> PullResult {
        let lock = self.project_lock(project).await;
        let _guard = lock.lock().await;

        let status = self.check_branch_status(project, branch, cancel).await;
        if !status.success {
            return PullResult::default().fail(SyncFailure::CommandFailed {
                detail: status.error.unwrap_or_default(),
            });
        }
        if !status.is_on_correct_branch {
            return PullResult::default().fail(SyncFailure::BranchMismatch {
                expected: branch.to_string(),
                actual: status.current_branch,
            });
        }

        let non_fleece = match self.non_fleece_changes(project).await {
            Ok(files) => files,
            Err(failure) => return PullResult::default().fail(failure),
        };
        if !non_fleece.is_empty() {
            return PullResult::default().fail(SyncFailure::NonFleeceChanges { files: non_fleece });
        }

        if status.behind == 0 {
            return PullResult {
                success: true,
                ..PullResult::default()
            };
        }

        self.pull_and_merge(project, branch, status.behind, cancel).await
    }

    /// Full synchronization: pull if behind, commit issue-store changes,
    /// push if ahead.
    pub async fn sync(
        &self,
        project: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let lock = self.project_lock(project).await;
        let _guard = lock.lock().await;

        let mut result = SyncResult::default();

        let status = self.check_branch_status(project, branch, cancel).await;
        if !status.success {
            return result.fail(SyncFailure::CommandFailed {
                detail: status.error.unwrap_or_default(),
            });
        }
        if !status.is_on_correct_branch {
            return result.fail(SyncFailure::BranchMismatch {
                expected: branch.to_string(),
                actual: status.current_branch,
            });
        }

        let non_fleece = match self.non_fleece_changes(project).await {
            Ok(files) => files,
            Err(failure) => return result.fail(failure),
        };
        if !non_fleece.is_empty() {
            return result.fail(SyncFailure::NonFleeceChanges { files: non_fleece });
        }

        if status.behind > 0 {
            let pull = self.pull_and_merge(project, branch, status.behind, cancel).await;
            if let Some(failure) = pull.failure {
                return result.fail(failure);
            }
            result.issues_merged = pull.issues_merged;
            result.commits_pulled = pull.commits_pulled;
        }

        if cancel.is_cancelled() {
            return result.fail(SyncFailure::Cancelled);
        }

        // Stage and commit whatever the issue store now holds.
        let entries = match self.changed_paths(project).await {
            Ok(entries) => entries,
            Err(failure) => return result.fail(failure),
        };
        let pending = entries
            .iter()
            .filter(|e| path_is_under(&e.path, &self.fleece_dir))
            .count();
        if pending > 0 {
            let add = self.git(project, &["add", "--", &self.fleece_dir]).await;
            if !add.success {
                return result.fail(SyncFailure::CommitFailed {
                    detail: add.combined(),
                });
            }
            let commit = self.git(project, &["commit", "-m", SYNC_COMMIT_MESSAGE]).await;
            if commit.success {
                result.files_committed = pending;
            } else if commit.mentions("nothing to commit") {
                // Benign: e.g. only mode/ignored noise was detected.
                result.files_committed = 0;
            } else {
                return result.fail(SyncFailure::CommitFailed {
                    detail: commit.combined(),
                });
            }
        }

        // Recompute ahead after committing; the earlier count is stale.
        let range = format!("HEAD...{}/{}", self.remote, branch);
        let counts = self
            .git(project, &["rev-list", "--left-right", "--count", &range])
            .await;
        if !counts.success {
            return result.fail(SyncFailure::CommandFailed {
                detail: counts.combined(),
            });
        }
        let ahead = parse_ahead_behind(&counts.stdout).map_or(0, |(a, _)| a);

        if ahead > 0 {
            let push = self.git(project, &["push", &self.remote, branch]).await;
            if push.success {
                result.pushed = true;
            } else if push.mentions("non-fast-forward")
                || push.mentions("rejected")
                || push.mentions("fetch first")
            {
                return result.fail(SyncFailure::PushRejected {
                    detail: push.combined(),
                });
            } else {
                return result.fail(SyncFailure::PushFailed {
                    detail: push.combined(),
                });
            }
        }

        result.success = true;
        result
    }

    /// Field-level merge against the remote branch, then a normal
    /// repository merge of everything else.
    ///
    /// Conflicts confined to the issue-store path are auto-resolved with
    /// the already-computed merged content; any conflict outside it aborts
    /// the merge and reports the offending files.
    pub async fn pull_changes(
        &self,
        project: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> PullResult {
        let lock = self.project_lock(project).await;
        let _guard = lock.lock().await;

        let mut result = PullResult::default();

        let fetch = self.git(project, &["fetch", &self.remote, branch]).await;
        if !fetch.success {
            return result.fail(SyncFailure::FetchFailed {
                detail: fetch.combined(),
            });
        }
        if cancel.is_cancelled() {
            return result.fail(SyncFailure::Cancelled);
        }

        let range = format!("HEAD...{}/{}", self.remote, branch);
        let counts = self
            .git(project, &["rev-list", "--left-right", "--count", &range])
            .await;
        if counts.success {
            result.commits_pulled = parse_ahead_behind(&counts.stdout).map_or(0, |(_, b)| b);
        }

        let local = match self.store.load_issues(project).await {
            Ok(issues) => issues,
            Err(e) => {
                return result.fail(SyncFailure::MergeLoadFailed {
                    detail: e.to_string(),
                });
            }
        };

        // Restore the remote copy of the issue-store path, load it as the
        // "remote" side of the field-level merge.
        let target = format!("{}/{}", self.remote, branch);
        let checkout = self
            .git(project, &["checkout", &target, "--", &self.fleece_dir])
            .await;
        let remote_issues = if checkout.success {
            self.store.invalidate(project).await;
            match self.store.load_issues(project).await {
                Ok(issues) => issues,
                Err(e) => {
                    return result.fail(SyncFailure::MergeLoadFailed {
                        detail: e.to_string(),
                    });
                }
            }
        } else if checkout.mentions("pathspec") || checkout.mentions("did not match") {
            // Remote branch has no issue store yet.
            Vec::new()
        } else {
            return result.fail(SyncFailure::CommandFailed {
                detail: checkout.combined(),
            });
        };

        let (merged, merged_count) = merge_issue_sets(local, remote_issues);
        result.issues_merged = merged_count;
        if let Err(e) = self.store.save_issues(project, &merged).await {
            return result.fail(SyncFailure::PersistFailed {
                detail: e.to_string(),
            });
        }

        let add = self.git(project, &["add", "--", &self.fleece_dir]).await;
        if !add.success {
            return result.fail(SyncFailure::CommitFailed {
                detail: add.combined(),
            });
        }
        let commit = self.git(project, &["commit", "-m", MERGE_COMMIT_MESSAGE]).await;
        if !commit.success && !commit.mentions("nothing to commit") {
            return result.fail(SyncFailure::CommitFailed {
                detail: commit.combined(),
            });
        }

        // Merge everything else normally.
        let merge = self.git(project, &["merge", &target]).await;
        if merge.success {
            result.success = true;
            return result;
        }
        if !merge.mentions("conflict") {
            return result.fail(SyncFailure::CommandFailed {
                detail: merge.combined(),
            });
        }

        let conflicted = self
            .git(project, &["diff", "--name-only", "--diff-filter=U"])
            .await;
        if !conflicted.success {
            return result.fail(SyncFailure::CommandFailed {
                detail: conflicted.combined(),
            });
        }
        let files: Vec<String> = conflicted
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        let non_fleece: Vec<String> = files
            .iter()
            .filter(|f| !path_is_under(f, &self.fleece_dir))
            .cloned()
            .collect();

        if non_fleece.is_empty() {
            // Conflicts are confined to the issue store: keep the computed
            // merged content and complete the merge commit.
            if let Err(e) = self.store.save_issues(project, &merged).await {
                return result.fail(SyncFailure::PersistFailed {
                    detail: e.to_string(),
                });
            }
            let add = self.git(project, &["add", "--", &self.fleece_dir]).await;
            if !add.success {
                return result.fail(SyncFailure::CommitFailed {
                    detail: add.combined(),
                });
            }
            let finish = self.git(project, &["commit", "--no-edit"]).await;
            if !finish.success && !finish.mentions("nothing to commit") {
                return result.fail(SyncFailure::CommitFailed {
                    detail: finish.combined(),
                });
            }
            result.success = true;
            result
        } else {
            let abort = self.git(project, &["merge", "--abort"]).await;
            if !abort.success {
                tracing::warn!("merge abort failed: {}", abort.combined());
            }
            result.fail(SyncFailure::NonFleeceChanges { files: non_fleece })
        }
    }

    /// Stash the entire working tree, including untracked files.
    ///
    /// # Errors
    ///
    /// Returns `StashFailed` when git refuses the stash.
    pub async fn stash_changes(&self, project: &Path) -> Result<(), SyncFailure> {
        let out = self
            .git(
                project,
                &["stash", "push", "--include-untracked", "-m", STASH_MESSAGE],
            )
            .await;
        if out.success {
            Ok(())
        } else {
            Err(SyncFailure::StashFailed {
                detail: out.combined(),
            })
        }
    }

    /// Abort any in-progress rebase, unstage, revert the working tree, and
    /// clean untracked files. Clean failures are logged, not fatal.
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` when unstaging or reverting fails.
    pub async fn discard_changes(&self, project: &Path) -> Result<(), SyncFailure> {
        // Harmless when no rebase is in flight.
        let abort = self.git(project, &["rebase", "--abort"]).await;
        if !abort.success {
            tracing::debug!("no rebase to abort: {}", abort.combined());
        }

        let reset = self.git(project, &["reset", "HEAD", "."]).await;
        if !reset.success {
            return Err(SyncFailure::CommandFailed {
                detail: reset.combined(),
            });
        }
        let revert = self.git(project, &["checkout", "--", "."]).await;
        if !revert.success {
            return Err(SyncFailure::CommandFailed {
                detail: revert.combined(),
            });
        }
        let clean = self.git(project, &["clean", "-fd"]).await;
        if !clean.success {
            tracing::warn!("clean of untracked files failed: {}", clean.combined());
        }
        Ok(())
    }

    /// Discard every working-tree change outside the issue-store path,
    /// continuing past per-file failures.
    ///
    /// # Errors
    ///
    /// Returns a failure only when the status listing itself fails.
    pub async fn discard_non_fleece_changes(&self, project: &Path) -> Result<(), SyncFailure> {
        let files = self.non_fleece_changes(project).await?;
        for file in files {
            let revert = self.git(project, &["checkout", "--", &file]).await;
            if revert.success {
                continue;
            }
            // Untracked files have no committed version to revert to.
            let remove = self.git(project, &["clean", "-f", "--", &file]).await;
            if !remove.success {
                tracing::warn!("failed to discard {file}: {}", remove.combined());
            }
        }
        Ok(())
    }

    /// Changed paths outside the issue-store path.
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` when the status listing fails.
    pub async fn non_fleece_changes(&self, project: &Path) -> Result<Vec<String>, SyncFailure> {
        Ok(self
            .changed_paths(project)
            .await?
            .into_iter()
            .filter(|e| !path_is_under(&e.path, &self.fleece_dir))
            .map(|e| e.path)
            .collect())
    }

    async fn changed_paths(&self, project: &Path) -> Result<Vec<StatusEntry>, SyncFailure> {
        let status = self.git(project, &["status", "--porcelain"]).await;
        if !status.success {
            return Err(SyncFailure::CommandFailed {
                detail: status.combined(),
            });
        }
        Ok(parse_porcelain(&status.stdout))
    }

    /// The pull-and-merge routine: stash local issue-store edits, fast
    /// forward, then field-merge the stashed set against the new disk set.
    async fn pull_and_merge(
        &self,
        project: &Path,
        branch: &str,
        behind: usize,
        cancel: &CancellationToken,
    ) -> PullResult {
        let result = PullResult::default();

        let entries = match self.changed_paths(project).await {
            Ok(entries) => entries,
            Err(failure) => return result.fail(failure),
        };
        let fleece_entries: Vec<StatusEntry> = entries
            .into_iter()
            .filter(|e| path_is_under(&e.path, &self.fleece_dir))
            .collect();
        let dirty = !fleece_entries.is_empty();

        // Durability anchor: hold the local set in memory before any git
        // mutation can alter or lose the working tree.
        let local_issues = if dirty {
            match self.store.load_issues(project).await {
                Ok(issues) => Some(issues),
                Err(e) => {
                    return result.fail(SyncFailure::MergeLoadFailed {
                        detail: e.to_string(),
                    });
                }
            }
        } else {
            None
        };

        let mut stashed = false;
        if dirty {
            let stash = self
                .git(
                    project,
                    &["stash", "push", "-m", STASH_MESSAGE, "--", &self.fleece_dir],
                )
                .await;
            if !stash.success {
                return result.fail(SyncFailure::StashFailed {
                    detail: stash.combined(),
                });
            }
            stashed = true;

            // A stash never captures untracked additions, and content
            // addressing creates new files on any edit: remove them
            // explicitly so the fast-forward cannot collide.
            for entry in fleece_entries.iter().filter(|e| e.is_untracked()) {
                let path = project.join(&entry.path);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(
                        "failed to remove untracked issue file {}: {e}",
                        path.display()
                    );
                }
            }
        }

        if cancel.is_cancelled() {
            if stashed {
                self.restore_stash(project).await;
            }
            return result.fail(SyncFailure::Cancelled);
        }

        let target = format!("{}/{}", self.remote, branch);
        let ff = self.git(project, &["merge", "--ff-only", &target]).await;
        if !ff.success {
            // Fatal and distinct: never fall back to a real merge here.
            if stashed {
                self.restore_stash(project).await;
            }
            return result.fail(SyncFailure::FastForwardFailed {
                detail: ff.combined(),
            });
        }

        let mut issues_merged = 0;
        if let Some(local) = local_issues {
            if cancel.is_cancelled() {
                if stashed {
                    self.restore_stash(project).await;
                }
                return result.fail(SyncFailure::Cancelled);
            }

            self.store.invalidate(project).await;
            let remote_issues = match self.store.load_issues(project).await {
                Ok(issues) => issues,
                Err(e) => {
                    if stashed {
                        self.restore_stash(project).await;
                    }
                    return result.fail(SyncFailure::MergeLoadFailed {
                        detail: e.to_string(),
                    });
                }
            };

            let (merged, merged_count) = merge_issue_sets(local, remote_issues);
            issues_merged = merged_count;
            if let Err(e) = self.store.save_issues(project, &merged).await {
                // The stash still holds the local edits; leave it in
                // place for manual recovery rather than popping over the
                // fast-forwarded tree.
                return result.fail(SyncFailure::PersistFailed {
                    detail: e.to_string(),
                });
            }

            // Drop, don't pop: a path-based pop merges by filename, and
            // content-addressed filenames change whenever content does, so
            // it would surface as unrelated add/delete pairs.
            if stashed {
                let drop = self.git(project, &["stash", "drop"]).await;
                if !drop.success {
                    tracing::warn!("stash drop failed: {}", drop.combined());
                }
            }
        }

        PullResult {
            success: true,
            issues_merged,
            commits_pulled: behind,
            ..PullResult::default()
        }
    }

    async fn restore_stash(&self, project: &Path) {
        let pop = self.git(project, &["stash", "pop"]).await;
        if !pop.success {
            tracing::warn!("best-effort stash restore failed: {}", pop.combined());
        }
    }
}

/// Union of two issue sets by id: one-sided ids pass through unchanged,
/// both-sided ids are field-merged. Returns the set and the merge count.
fn merge_issue_sets(local: Vec<Issue>, remote: Vec<Issue>) -> (Vec<Issue>, usize) {
    let mut remote_map: HashMap<IssueId, Issue> = remote
        .into_iter()
        .map(|issue| (issue.id.clone(), issue))
        .collect();

    let mut merged = Vec::with_capacity(local.len() + remote_map.len());
    let mut merged_count = 0;
    for local_issue in local {
        if let Some(remote_issue) = remote_map.remove(&local_issue.id) {
            merged.push(merge_issues(&local_issue, &remote_issue));
            merged_count += 1;
        } else {
            merged.push(local_issue);
        }
    }
    merged.extend(remote_map.into_values());
    (merged, merged_count)
}

fn parse_ahead_behind(stdout: &str) -> Option<(usize, usize)> {
    let mut parts = stdout.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}
