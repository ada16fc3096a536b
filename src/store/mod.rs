//! Content-addressed issue storage.
//!
//! Issues persist as one pretty-printed JSON file each under
//! `<project>/<fleece_dir>/issues/`, named `issue-<hash[..16]>.json` where
//! the hash is the issue's own content hash, so any content change
//! produces a new filename. `FileIssueStore` keeps a
//! per-project handle memo; `invalidate` drops it after anything mutates
//! the files without going through the store (git fast-forward, snapshot
//! restore).

use crate::error::{FleeceError, Result};
use crate::model::Issue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

const ISSUE_FILE_PREFIX: &str = "issue-";
const ISSUE_FILE_EXT: &str = "json";

/// Loads and saves the full issue set for a project.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Load every issue in the project's issue-store path.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be read or a file
    /// cannot be parsed.
    async fn load_issues(&self, project: &Path) -> Result<Vec<Issue>>;

    /// Replace the persisted issue set with `issues`.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or any file write fails.
    async fn save_issues(&self, project: &Path, issues: &[Issue]) -> Result<()>;

    /// Drop any cached handle so the next load re-reads from disk.
    async fn invalidate(&self, project: &Path);
}

/// File-backed issue store with a per-project loaded-set memo.
pub struct FileIssueStore {
    fleece_dir: String,
    loaded: RwLock<HashMap<PathBuf, Arc<Vec<Issue>>>>,
}

impl FileIssueStore {
    #[must_use]
    pub fn new(fleece_dir: impl Into<String>) -> Self {
        Self {
            fleece_dir: fleece_dir.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Repo-relative issue-store directory name (e.g. ".fleece").
    #[must_use]
    pub fn fleece_dir(&self) -> &str {
        &self.fleece_dir
    }

    fn issues_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.fleece_dir).join("issues")
    }

    async fn read_from_disk(&self, project: &Path) -> Result<Vec<Issue>> {
        let dir = self.issues_dir(project);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut issues = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_issue_file = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ISSUE_FILE_EXT));
            if !is_issue_file {
                continue;
            }

            let contents = fs::read_to_string(&path).await?;
            let issue: Issue = serde_json::from_str(&contents).map_err(|e| {
                FleeceError::CorruptIssueFile {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            issues.push(issue);
        }

        // Stable order keeps downstream merges and snapshots deterministic.
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(issues)
    }
}

#[async_trait]
impl IssueStore for FileIssueStore {
    async fn load_issues(&self, project: &Path) -> Result<Vec<Issue>> {
        if let Some(cached) = self.loaded.read().await.get(project) {
            return Ok(cached.as_ref().clone());
        }

        let issues = self.read_from_disk(project).await?;
        self.loaded
            .write()
            .await
            .insert(project.to_path_buf(), Arc::new(issues.clone()));
        Ok(issues)
    }

    async fn save_issues(&self, project: &Path, issues: &[Issue]) -> Result<()> {
        let dir = self.issues_dir(project);
        fs::create_dir_all(&dir).await?;

        // Serialize first so a failure leaves the directory untouched.
        let mut desired: HashMap<String, Vec<u8>> = HashMap::new();
        for issue in issues {
            let body = serde_json::to_vec_pretty(issue)?;
            let hash = issue.compute_content_hash();
            let name = format!("{ISSUE_FILE_PREFIX}{}.{ISSUE_FILE_EXT}", &hash[..16]);
            desired.insert(name, body);
        }

        // Remove stale content-addressed files no longer in the set.
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_issue_file = name.starts_with(ISSUE_FILE_PREFIX)
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(ISSUE_FILE_EXT));
            if is_issue_file && !desired.contains_key(name) {
                fs::remove_file(&path).await?;
            }
        }

        // Content-addressed: an existing file with the same name already
        // holds the same issue content, so only missing files are written.
        for (name, body) in &desired {
            let target = dir.join(name);
            if target.exists() {
                continue;
            }
            let tmp = dir.join(format!(".{name}.tmp"));
            fs::write(&tmp, body).await?;
            fs::rename(&tmp, &target).await?;
        }

        let mut sorted: Vec<Issue> = issues.to_vec();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        self.loaded
            .write()
            .await
            .insert(project.to_path_buf(), Arc::new(sorted));
        Ok(())
    }

    async fn invalidate(&self, project: &Path) {
        self.loaded.write().await.remove(project);
    }
}
