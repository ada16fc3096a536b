//! Write-through in-memory issue cache.
//!
//! All reads and mutations go through `IssueCache`. Each project gets one
//! lazily loaded id-indexed map; mutations persist the full set through
//! the store before touching the map, then enqueue a background
//! checkpoint and record an undo snapshot. The synchronous persist is the
//! durability guarantee; checkpoint and snapshot failures degrade to
//! warnings, never to a failed operation.

pub mod queue;

pub use queue::{DEFAULT_QUEUE_CAPACITY, SerializationQueue};

use crate::error::{FleeceError, Result};
use crate::history::{HistoryLog, OperationKind, SnapshotMeta};
use crate::model::{Issue, IssueId, IssuePatch, IssueType, ParentRef, Priority, Status};
use crate::store::IssueStore;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Listing criteria; an unset field matches everything.
///
/// With no status criterion the terminal statuses are hidden, so a bare
/// listing shows only live work.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<Status>,
    pub issue_type: Option<IssueType>,
    pub priority: Option<Priority>,
}

impl ListFilter {
    fn matches(&self, issue: &Issue) -> bool {
        let status_ok = match &self.status {
            Some(status) => issue.status == *status,
            None => !issue.status.is_terminal(),
        };
        status_ok
            && self
                .issue_type
                .as_ref()
                .is_none_or(|t| issue.issue_type == *t)
            && self.priority.is_none_or(|p| issue.priority == p)
    }
}

#[derive(Default)]
struct ProjectSlot {
    issues: RwLock<Option<HashMap<IssueId, Issue>>>,
}

/// Per-project issue state, loaded once and kept authoritative until a
/// reload.
pub struct IssueCache {
    store: Arc<dyn IssueStore>,
    history: Arc<HistoryLog>,
    queue: SerializationQueue,
    projects: RwLock<HashMap<PathBuf, Arc<ProjectSlot>>>,
}

impl IssueCache {
    #[must_use]
    pub fn new(
        store: Arc<dyn IssueStore>,
        history: Arc<HistoryLog>,
        queue: SerializationQueue,
    ) -> Self {
        Self {
            store,
            history,
            queue,
            projects: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, project: &Path) -> Arc<ProjectSlot> {
        if let Some(slot) = self.projects.read().await.get(project) {
            return Arc::clone(slot);
        }
        let mut projects = self.projects.write().await;
        Arc::clone(
            projects
                .entry(project.to_path_buf())
                .or_insert_with(|| Arc::new(ProjectSlot::default())),
        )
    }

    /// Populate the map while it is empty; once loaded it stays
    /// authoritative and concurrent callers share the same load.
    async fn ensure_map<'a>(
        &self,
        project: &Path,
        guard: &'a mut Option<HashMap<IssueId, Issue>>,
    ) -> Result<&'a mut HashMap<IssueId, Issue>> {
        if guard.is_none() {
            let issues = self.store.load_issues(project).await?;
            *guard = Some(index_issues(issues));
        }
        Ok(guard.get_or_insert_with(HashMap::new))
    }

    /// Run `f` against the project's map without blocking other readers.
    ///
    /// Populated maps are served under the shared read lock. A cold map
    /// is loaded from the store with no lock held at all; racing loaders
    /// each read the store and the first install wins, so a slow load
    /// never parks the other readers on a lock.
    async fn with_map<T>(
        &self,
        project: &Path,
        f: impl FnOnce(&HashMap<IssueId, Issue>) -> T,
    ) -> Result<T> {
        let slot = self.slot(project).await;
        {
            let guard = slot.issues.read().await;
            if let Some(map) = guard.as_ref() {
                return Ok(f(map));
            }
        }

        let issues = self.store.load_issues(project).await?;
        let mut guard = slot.issues.write().await;
        let map = guard.get_or_insert_with(|| index_issues(issues));
        Ok(f(map))
    }

    /// Fetch one issue by case-insensitive id.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` when the id is unknown.
    pub async fn get_issue(&self, project: &Path, id: &IssueId) -> Result<Issue> {
        let found = self.with_map(project, |map| map.get(id).cloned()).await?;
        found.ok_or_else(|| FleeceError::IssueNotFound {
            id: id.to_string(),
        })
    }

    /// List issues matching `filter`, sorted by priority then id.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial load from disk fails.
    pub async fn list_issues(&self, project: &Path, filter: &ListFilter) -> Result<Vec<Issue>> {
        let mut issues = self
            .with_map(project, |map| {
                map.values()
                    .filter(|i| filter.matches(i))
                    .cloned()
                    .collect::<Vec<Issue>>()
            })
            .await?;
        issues.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(issues)
    }

    /// Issues that are active and whose present parents all satisfy the
    /// dependency. A parent id with no matching issue does not block.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial load from disk fails.
    pub async fn ready_issues(&self, project: &Path) -> Result<Vec<Issue>> {
        let mut ready = self.with_map(project, collect_ready).await?;
        ready.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(ready)
    }

    /// Create a new issue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id, `IdCollision` when an
    /// issue with the same id (ignoring case) already exists, or a store
    /// error when persisting fails.
    pub async fn create_issue(&self, project: &Path, issue: Issue) -> Result<Issue> {
        if !issue.id.is_well_formed() {
            return Err(FleeceError::InvalidId {
                id: issue.id.to_string(),
            });
        }

        let slot = self.slot(project).await;
        let mut guard = slot.issues.write().await;
        let map = self.ensure_map(project, &mut guard).await?;

        if map.contains_key(&issue.id) {
            return Err(FleeceError::IdCollision {
                id: issue.id.to_string(),
            });
        }

        let mut snapshot: Vec<Issue> = map.values().cloned().collect();
        snapshot.push(issue.clone());
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        self.store.save_issues(project, &snapshot).await?;
        map.insert(issue.id.clone(), issue.clone());
        drop(guard);

        self.queue.enqueue_write(project, issue.clone());
        self.record(
            project,
            &snapshot,
            OperationKind::Create,
            Some(issue.id.clone()),
            format!("create {}", issue.id),
        )
        .await;
        Ok(issue)
    }

    /// Apply a partial update to an existing issue.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` for an unknown id, or a store error when
    /// persisting fails.
    pub async fn update_issue(
        &self,
        project: &Path,
        id: &IssueId,
        patch: &IssuePatch,
    ) -> Result<Issue> {
        let slot = self.slot(project).await;
        let mut guard = slot.issues.write().await;
        let map = self.ensure_map(project, &mut guard).await?;

        let current = map.get(id).ok_or_else(|| FleeceError::IssueNotFound {
            id: id.to_string(),
        })?;
        let updated = current.apply(patch, Utc::now());

        let snapshot = with_replacement(map, &updated);
        self.store.save_issues(project, &snapshot).await?;
        map.insert(updated.id.clone(), updated.clone());
        drop(guard);

        self.queue.enqueue_write(project, updated.clone());
        self.record(
            project,
            &snapshot,
            OperationKind::Update,
            Some(updated.id.clone()),
            format!("update {}", updated.id),
        )
        .await;
        Ok(updated)
    }

    /// Delete an issue. Parent edges pointing at it on other issues are
    /// left in place; a dangling parent never blocks readiness.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` for an unknown id, or a store error when
    /// persisting fails.
    pub async fn delete_issue(&self, project: &Path, id: &IssueId) -> Result<()> {
        let slot = self.slot(project).await;
        let mut guard = slot.issues.write().await;
        let map = self.ensure_map(project, &mut guard).await?;

        if !map.contains_key(id) {
            return Err(FleeceError::IssueNotFound {
                id: id.to_string(),
            });
        }

        let mut snapshot: Vec<Issue> = map
            .values()
            .filter(|i| i.id != *id)
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        self.store.save_issues(project, &snapshot).await?;
        map.remove(id);
        drop(guard);

        self.queue.enqueue_delete(project, id.clone());
        self.record(
            project,
            &snapshot,
            OperationKind::Delete,
            Some(id.clone()),
            format!("delete {id}"),
        )
        .await;
        Ok(())
    }

    /// Link `child` under `parent`, appended after existing siblings.
    ///
    /// # Errors
    ///
    /// Returns `SelfParent` when the ids match, `IssueNotFound` when
    /// either side is unknown, and `DuplicateParent` when the edge
    /// already exists.
    pub async fn add_parent(
        &self,
        project: &Path,
        child: &IssueId,
        parent: &IssueId,
    ) -> Result<Issue> {
        if child == parent {
            return Err(FleeceError::SelfParent {
                id: child.to_string(),
            });
        }

        let slot = self.slot(project).await;
        let mut guard = slot.issues.write().await;
        let map = self.ensure_map(project, &mut guard).await?;

        if !map.contains_key(parent) {
            return Err(FleeceError::IssueNotFound {
                id: parent.to_string(),
            });
        }
        let current = map.get(child).ok_or_else(|| FleeceError::IssueNotFound {
            id: child.to_string(),
        })?;
        if current.parents.iter().any(|edge| edge.parent_id == *parent) {
            return Err(FleeceError::DuplicateParent {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        let mut updated = current.clone();
        let next_order = updated
            .parents
            .iter()
            .map(|edge| edge.sort_order)
            .max()
            .map_or(0, |max| max + 1);
        updated.parents.push(ParentRef {
            parent_id: parent.clone(),
            sort_order: next_order,
        });
        updated.last_update = Utc::now();

        let snapshot = with_replacement(map, &updated);
        self.store.save_issues(project, &snapshot).await?;
        map.insert(updated.id.clone(), updated.clone());
        drop(guard);

        self.queue.enqueue_write(project, updated.clone());
        self.record(
            project,
            &snapshot,
            OperationKind::AddParent,
            Some(child.clone()),
            format!("link {child} under {parent}"),
        )
        .await;
        Ok(updated)
    }

    /// Remove the parent edge from `child` to `parent`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` for an unknown child and `ParentNotFound`
    /// when no such edge exists.
    pub async fn remove_parent(
        &self,
        project: &Path,
        child: &IssueId,
        parent: &IssueId,
    ) -> Result<Issue> {
        let slot = self.slot(project).await;
        let mut guard = slot.issues.write().await;
        let map = self.ensure_map(project, &mut guard).await?;

        let current = map.get(child).ok_or_else(|| FleeceError::IssueNotFound {
            id: child.to_string(),
        })?;
        if !current.parents.iter().any(|edge| edge.parent_id == *parent) {
            return Err(FleeceError::ParentNotFound {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        let mut updated = current.clone();
        updated.parents.retain(|edge| edge.parent_id != *parent);
        updated.last_update = Utc::now();

        let snapshot = with_replacement(map, &updated);
        self.store.save_issues(project, &snapshot).await?;
        map.insert(updated.id.clone(), updated.clone());
        drop(guard);

        self.queue.enqueue_write(project, updated.clone());
        self.record(
            project,
            &snapshot,
            OperationKind::RemoveParent,
            Some(child.clone()),
            format!("unlink {child} from {parent}"),
        )
        .await;
        Ok(updated)
    }

    /// Drop the in-memory map and the store memo, then reload from disk.
    /// Call after anything mutates the issue files out of band (sync,
    /// snapshot restore).
    ///
    /// # Errors
    ///
    /// Returns an error when the reload from disk fails.
    pub async fn reload_from_disk(&self, project: &Path) -> Result<Vec<Issue>> {
        self.store.invalidate(project).await;
        let issues = self.store.load_issues(project).await?;
        let slot = self.slot(project).await;
        *slot.issues.write().await = Some(index_issues(issues.clone()));
        Ok(issues)
    }

    /// Step back one history snapshot, restoring it to disk and memory.
    ///
    /// Returns `Ok(None)` when no older snapshot exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be read or restored.
    pub async fn undo(&self, project: &Path) -> Result<Option<Vec<Issue>>> {
        let Some(issues) = self.history.undo(project).await? else {
            return Ok(None);
        };
        self.apply_snapshot(project, &issues).await?;
        Ok(Some(issues))
    }

    /// Step forward one history snapshot, restoring it to disk and memory.
    ///
    /// Returns `Ok(None)` when already at the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be read or restored.
    pub async fn redo(&self, project: &Path) -> Result<Option<Vec<Issue>>> {
        let Some(issues) = self.history.redo(project).await? else {
            return Ok(None);
        };
        self.apply_snapshot(project, &issues).await?;
        Ok(Some(issues))
    }

    /// Snapshot metadata in recording order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted history state cannot be read.
    pub async fn history_entries(&self, project: &Path) -> Result<Vec<SnapshotMeta>> {
        self.history.entries(project).await
    }

    /// Wait for every enqueued background checkpoint to land.
    pub async fn flush_checkpoints(&self) {
        self.queue.flush().await;
    }

    async fn apply_snapshot(&self, project: &Path, issues: &[Issue]) -> Result<()> {
        self.store.save_issues(project, issues).await?;
        let slot = self.slot(project).await;
        *slot.issues.write().await = Some(index_issues(issues.to_vec()));
        Ok(())
    }

    /// Record an undo snapshot; failure degrades to a warning because the
    /// mutation itself already persisted.
    async fn record(
        &self,
        project: &Path,
        issues: &[Issue],
        operation: OperationKind,
        affected_issue: Option<IssueId>,
        description: String,
    ) {
        let meta = SnapshotMeta {
            timestamp: Utc::now(),
            operation,
            affected_issue,
            description,
        };
        if let Err(e) = self.history.record_snapshot(project, issues, meta).await {
            tracing::warn!("failed to record history snapshot: {e}");
        }
    }
}

fn collect_ready(map: &HashMap<IssueId, Issue>) -> Vec<Issue> {
    map.values()
        .filter(|issue| {
            issue.status.is_active()
                && issue.parents.iter().all(|edge| {
                    map.get(&edge.parent_id)
                        .is_none_or(|parent| parent.status.satisfies_dependency())
                })
        })
        .cloned()
        .collect()
}

fn index_issues(issues: Vec<Issue>) -> HashMap<IssueId, Issue> {
    issues
        .into_iter()
        .map(|issue| (issue.id.clone(), issue))
        .collect()
}

fn with_replacement(map: &HashMap<IssueId, Issue>, updated: &Issue) -> Vec<Issue> {
    let mut snapshot: Vec<Issue> = map
        .values()
        .filter(|i| i.id != updated.id)
        .cloned()
        .collect();
    snapshot.push(updated.clone());
    snapshot.sort_by(|a, b| a.id.cmp(&b.id));
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileIssueStore;
    use tempfile::TempDir;

    fn cache() -> IssueCache {
        let store: Arc<dyn IssueStore> = Arc::new(FileIssueStore::new(".fleece"));
        let history = Arc::new(HistoryLog::new(".fleece"));
        let queue = SerializationQueue::start(Arc::clone(&store), 64);
        IssueCache::new(store, history, queue)
    }

    #[tokio::test]
    async fn create_then_get_and_list() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-1", "First"))
            .await
            .unwrap();
        let fetched = cache
            .get_issue(temp.path(), &IssueId::from("FL-1"))
            .await
            .unwrap();
        assert_eq!(fetched.title, "First");

        let listed = cache
            .list_issues(temp.path(), &ListFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_malformed_id() {
        let temp = TempDir::new().unwrap();
        let cache = cache();
        let err = cache
            .create_issue(temp.path(), Issue::new("not an id", "Bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn create_rejects_case_insensitive_collision() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-abc", "First"))
            .await
            .unwrap();
        let err = cache
            .create_issue(temp.path(), Issue::new("FL-ABC", "Clone"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::IdCollision { .. }));
    }

    #[tokio::test]
    async fn update_patches_and_persists() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        let created = cache
            .create_issue(temp.path(), Issue::new("fl-1", "Original"))
            .await
            .unwrap();
        let patch = IssuePatch {
            status: Some(Status::Progress),
            ..IssuePatch::default()
        };
        let updated = cache
            .update_issue(temp.path(), &created.id, &patch)
            .await
            .unwrap();
        assert_eq!(updated.status, Status::Progress);
        assert!(updated.last_update >= created.last_update);

        // Visible after a cold reload.
        let reloaded = cache.reload_from_disk(temp.path()).await.unwrap();
        assert_eq!(reloaded[0].status, Status::Progress);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let temp = TempDir::new().unwrap();
        let cache = cache();
        let err = cache
            .update_issue(
                temp.path(),
                &IssueId::from("fl-ghost"),
                &IssuePatch::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::IssueNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_removes_from_map_and_disk() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-1", "Doomed"))
            .await
            .unwrap();
        cache
            .delete_issue(temp.path(), &IssueId::from("fl-1"))
            .await
            .unwrap();

        let err = cache
            .get_issue(temp.path(), &IssueId::from("fl-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::IssueNotFound { .. }));
        assert!(cache.reload_from_disk(temp.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn default_listing_hides_terminal_statuses() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-open", "Open"))
            .await
            .unwrap();
        let mut done = Issue::new("fl-done", "Done");
        done.status = Status::Complete;
        cache.create_issue(temp.path(), done).await.unwrap();

        let listed = cache
            .list_issues(temp.path(), &ListFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "fl-open");

        // An explicit status criterion shows terminal issues again.
        let filter = ListFilter {
            status: Some(Status::Complete),
            ..ListFilter::default()
        };
        let complete = cache.list_issues(temp.path(), &filter).await.unwrap();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].id.as_str(), "fl-done");
    }

    #[tokio::test]
    async fn parent_linking_rules() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-p", "Parent"))
            .await
            .unwrap();
        cache
            .create_issue(temp.path(), Issue::new("fl-c", "Child"))
            .await
            .unwrap();

        let child = IssueId::from("fl-c");
        let parent = IssueId::from("fl-p");

        let err = cache
            .add_parent(temp.path(), &child, &child)
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::SelfParent { .. }));

        let err = cache
            .add_parent(temp.path(), &child, &IssueId::from("fl-ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::IssueNotFound { .. }));

        let linked = cache.add_parent(temp.path(), &child, &parent).await.unwrap();
        assert_eq!(linked.parents.len(), 1);

        let err = cache
            .add_parent(temp.path(), &child, &IssueId::from("FL-P"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::DuplicateParent { .. }));

        let unlinked = cache
            .remove_parent(temp.path(), &child, &parent)
            .await
            .unwrap();
        assert!(unlinked.parents.is_empty());

        let err = cache
            .remove_parent(temp.path(), &child, &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, FleeceError::ParentNotFound { .. }));
    }

    #[tokio::test]
    async fn ready_requires_parents_satisfied_or_absent() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-p", "Parent"))
            .await
            .unwrap();
        cache
            .create_issue(temp.path(), Issue::new("fl-c", "Child"))
            .await
            .unwrap();
        let child = IssueId::from("fl-c");
        let parent = IssueId::from("fl-p");
        cache.add_parent(temp.path(), &child, &parent).await.unwrap();

        // Open parent blocks the child.
        let ready = cache.ready_issues(temp.path()).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, parent);

        // Completing the parent unblocks the child and removes the parent
        // from the ready set.
        let patch = IssuePatch {
            status: Some(Status::Complete),
            ..IssuePatch::default()
        };
        cache.update_issue(temp.path(), &parent, &patch).await.unwrap();
        let ready = cache.ready_issues(temp.path()).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, child);

        // A dangling parent edge never blocks.
        let mut orphan = Issue::new("fl-o", "Orphan");
        orphan.parents.push(ParentRef {
            parent_id: IssueId::from("fl-missing"),
            sort_order: 0,
        });
        cache.create_issue(temp.path(), orphan).await.unwrap();
        let ready = cache.ready_issues(temp.path()).await.unwrap();
        assert!(ready.iter().any(|i| i.id.as_str() == "fl-o"));
    }

    #[tokio::test]
    async fn undo_and_redo_restore_disk_and_memory() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        cache
            .create_issue(temp.path(), Issue::new("fl-1", "First"))
            .await
            .unwrap();
        cache
            .create_issue(temp.path(), Issue::new("fl-2", "Second"))
            .await
            .unwrap();

        let undone = cache.undo(temp.path()).await.unwrap().unwrap();
        assert_eq!(undone.len(), 1);
        assert!(
            cache
                .get_issue(temp.path(), &IssueId::from("fl-2"))
                .await
                .is_err()
        );
        assert_eq!(cache.reload_from_disk(temp.path()).await.unwrap().len(), 1);

        let redone = cache.redo(temp.path()).await.unwrap().unwrap();
        assert_eq!(redone.len(), 2);
        assert!(
            cache
                .get_issue(temp.path(), &IssueId::from("fl-2"))
                .await
                .is_ok()
        );

        // Both ends exhausted.
        cache.undo(temp.path()).await.unwrap().unwrap();
        assert!(cache.undo(temp.path()).await.unwrap().is_none());
        cache.redo(temp.path()).await.unwrap().unwrap();
        assert!(cache.redo(temp.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoints_flush_cleanly() {
        let temp = TempDir::new().unwrap();
        let cache = cache();

        for n in 0..10 {
            cache
                .create_issue(temp.path(), Issue::new(format!("fl-{n}"), "Bulk"))
                .await
                .unwrap();
        }
        cache.flush_checkpoints().await;
        assert_eq!(cache.reload_from_disk(temp.path()).await.unwrap().len(), 10);
    }
}
