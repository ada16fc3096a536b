//! Undo/redo snapshot log.
//!
//! Every mutating cache operation records a full, timestamped copy of the
//! project's issue set. Snapshots live under
//! `<project>/<fleece_dir>/history/` as one `<key>.snapshot.json` plus one
//! `<key>.meta.json` per recorded key, with a single `current` pointer
//! file, so a restart loses nothing. The log is linear: recording while
//! rewound discards everything after the pointer, and the oldest entries
//! beyond the retention limit are pruned.

use crate::error::{FleeceError, Result};
use crate::model::{Issue, IssueId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// Maximum snapshots retained per project.
pub const RETENTION_LIMIT: usize = 100;

const SNAPSHOT_SUFFIX: &str = ".snapshot.json";
const META_SUFFIX: &str = ".meta.json";
const POINTER_FILE: &str = "current";

/// What kind of cache mutation produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    AddParent,
    RemoveParent,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AddParent => "add_parent",
            Self::RemoveParent => "remove_parent",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata persisted alongside each snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub timestamp: DateTime<Utc>,
    pub operation: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_issue: Option<IssueId>,
    pub description: String,
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    meta: SnapshotMeta,
}

#[derive(Debug, Default)]
struct ProjectHistory {
    loaded: bool,
    entries: Vec<Entry>,
    cursor: Option<usize>,
}

/// Append-only, prunable snapshot sequence with a current pointer.
pub struct HistoryLog {
    fleece_dir: String,
    projects: RwLock<HashMap<PathBuf, Arc<Mutex<ProjectHistory>>>>,
}

impl HistoryLog {
    #[must_use]
    pub fn new(fleece_dir: impl Into<String>) -> Self {
        Self {
            fleece_dir: fleece_dir.into(),
            projects: RwLock::new(HashMap::new()),
        }
    }

    fn history_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.fleece_dir).join("history")
    }

    async fn project_state(&self, project: &Path) -> Arc<Mutex<ProjectHistory>> {
        if let Some(state) = self.projects.read().await.get(project) {
            return Arc::clone(state);
        }
        let mut projects = self.projects.write().await;
        Arc::clone(
            projects
                .entry(project.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(ProjectHistory::default()))),
        )
    }

    /// Record a new snapshot and make it the current pointer.
    ///
    /// Discards any entries after the pointer first (no branching redo),
    /// then prunes the oldest entries beyond [`RETENTION_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot or pointer cannot be persisted.
    pub async fn record_snapshot(
        &self,
        project: &Path,
        issues: &[Issue],
        meta: SnapshotMeta,
    ) -> Result<()> {
        let state = self.project_state(project).await;
        let mut history = state.lock().await;
        self.ensure_loaded(project, &mut history).await?;

        let dir = self.history_dir(project);
        fs::create_dir_all(&dir).await?;

        // Recording while rewound discards the stale redo tail.
        if let Some(cursor) = history.cursor {
            if cursor + 1 < history.entries.len() {
                let dropped: Vec<Entry> = history.entries.split_off(cursor + 1);
                for entry in &dropped {
                    remove_snapshot_files(&dir, &entry.key).await;
                }
            }
        }

        // Keys sort lexicographically; bump by a millisecond on collision.
        let mut timestamp = meta.timestamp;
        let mut key = snapshot_key(timestamp);
        while history.entries.last().is_some_and(|last| key <= last.key) {
            timestamp += Duration::milliseconds(1);
            key = snapshot_key(timestamp);
        }

        let snapshot_body = serde_json::to_vec_pretty(&issues)?;
        fs::write(dir.join(format!("{key}{SNAPSHOT_SUFFIX}")), snapshot_body).await?;
        let meta_body = serde_json::to_vec_pretty(&meta)?;
        fs::write(dir.join(format!("{key}{META_SUFFIX}")), meta_body).await?;

        history.entries.push(Entry { key, meta });
        history.cursor = Some(history.entries.len() - 1);
        self.persist_pointer(&dir, &history).await?;

        while history.entries.len() > RETENTION_LIMIT {
            let oldest = history.entries.remove(0);
            remove_snapshot_files(&dir, &oldest.key).await;
            history.cursor = history.cursor.map(|c| c.saturating_sub(1));
        }

        Ok(())
    }

    /// Move the pointer back one snapshot and return its issue list.
    ///
    /// Returns `Ok(None)` when already at the oldest snapshot (or the log
    /// is empty); that is unavailability, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot file cannot be read.
    pub async fn undo(&self, project: &Path) -> Result<Option<Vec<Issue>>> {
        let state = self.project_state(project).await;
        let mut history = state.lock().await;
        self.ensure_loaded(project, &mut history).await?;

        let Some(cursor) = history.cursor else {
            return Ok(None);
        };
        if cursor == 0 {
            return Ok(None);
        }

        let dir = self.history_dir(project);
        let target = cursor - 1;
        let issues = read_snapshot(&dir, &history.entries[target].key).await?;
        history.cursor = Some(target);
        self.persist_pointer(&dir, &history).await?;
        Ok(Some(issues))
    }

    /// Move the pointer forward one snapshot and return its issue list.
    ///
    /// Returns `Ok(None)` when already at the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot file cannot be read.
    pub async fn redo(&self, project: &Path) -> Result<Option<Vec<Issue>>> {
        let state = self.project_state(project).await;
        let mut history = state.lock().await;
        self.ensure_loaded(project, &mut history).await?;

        let Some(cursor) = history.cursor else {
            return Ok(None);
        };
        if cursor + 1 >= history.entries.len() {
            return Ok(None);
        }

        let dir = self.history_dir(project);
        let target = cursor + 1;
        let issues = read_snapshot(&dir, &history.entries[target].key).await?;
        history.cursor = Some(target);
        self.persist_pointer(&dir, &history).await?;
        Ok(Some(issues))
    }

    /// True when the pointer is the final entry or no history exists.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted history state cannot be read.
    pub async fn is_at_latest(&self, project: &Path) -> Result<bool> {
        let state = self.project_state(project).await;
        let mut history = state.lock().await;
        self.ensure_loaded(project, &mut history).await?;

        Ok(history.entries.is_empty()
            || history.cursor == Some(history.entries.len() - 1))
    }

    /// Snapshot metadata in recording order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted history state cannot be read.
    pub async fn entries(&self, project: &Path) -> Result<Vec<SnapshotMeta>> {
        let state = self.project_state(project).await;
        let mut history = state.lock().await;
        self.ensure_loaded(project, &mut history).await?;

        Ok(history.entries.iter().map(|e| e.meta.clone()).collect())
    }

    async fn ensure_loaded(&self, project: &Path, history: &mut ProjectHistory) -> Result<()> {
        if history.loaded {
            return Ok(());
        }

        let dir = self.history_dir(project);
        if dir.exists() {
            let mut entries = Vec::new();
            let mut dir_entries = fs::read_dir(&dir).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let Some(key) = name.strip_suffix(META_SUFFIX) else {
                    continue;
                };
                let contents = fs::read_to_string(entry.path()).await?;
                let meta: SnapshotMeta =
                    serde_json::from_str(&contents).map_err(|e| FleeceError::History {
                        reason: format!("bad snapshot metadata '{name}': {e}"),
                    })?;
                entries.push(Entry {
                    key: key.to_string(),
                    meta,
                });
            }
            entries.sort_by(|a, b| a.key.cmp(&b.key));

            let pointer = match fs::read_to_string(dir.join(POINTER_FILE)).await {
                Ok(raw) => Some(raw.trim().to_string()),
                Err(_) => None,
            };
            history.cursor = match (&pointer, entries.is_empty()) {
                (_, true) => None,
                (Some(key), false) => Some(
                    entries
                        .iter()
                        .position(|e| &e.key == key)
                        .unwrap_or(entries.len() - 1),
                ),
                (None, false) => Some(entries.len() - 1),
            };
            history.entries = entries;
        }

        history.loaded = true;
        Ok(())
    }

    async fn persist_pointer(&self, dir: &Path, history: &ProjectHistory) -> Result<()> {
        if let Some(cursor) = history.cursor {
            fs::write(dir.join(POINTER_FILE), &history.entries[cursor].key).await?;
        }
        Ok(())
    }
}

fn snapshot_key(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d_%H%M%S_%3f").to_string()
}

async fn read_snapshot(dir: &Path, key: &str) -> Result<Vec<Issue>> {
    let path = dir.join(format!("{key}{SNAPSHOT_SUFFIX}"));
    let contents = fs::read_to_string(&path).await?;
    serde_json::from_str(&contents).map_err(|e| FleeceError::History {
        reason: format!("bad snapshot '{}': {e}", path.display()),
    })
}

async fn remove_snapshot_files(dir: &Path, key: &str) {
    for suffix in [SNAPSHOT_SUFFIX, META_SUFFIX] {
        let path = dir.join(format!("{key}{suffix}"));
        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!("failed to remove snapshot file {}: {e}", path.display());
        }
    }
}
