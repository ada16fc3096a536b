//! Background persistence checkpoints.
//!
//! Mutations persist synchronously before they return; the queue is a
//! second line of defense that re-applies a checkpoint only when the
//! persisted copy is missing or strictly older than the checkpointed
//! `last_update`. Re-applying an already-persisted checkpoint is a no-op,
//! so replays are harmless. A full queue drops the checkpoint with a
//! warning rather than blocking the caller.

use crate::model::{Issue, IssueId};
use crate::store::IssueStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Default bound for the checkpoint channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
enum Checkpoint {
    Write { project: PathBuf, issue: Issue },
    Delete { project: PathBuf, id: IssueId },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background checkpoint worker.
///
/// Dropping the handle closes the channel and the worker drains what it
/// already holds, then exits.
pub struct SerializationQueue {
    tx: mpsc::Sender<Checkpoint>,
}

impl SerializationQueue {
    /// Spawn the worker task and return the enqueue handle.
    #[must_use]
    pub fn start(store: Arc<dyn IssueStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(store, rx));
        Self { tx }
    }

    /// Enqueue a write checkpoint; drops it with a warning when full.
    pub fn enqueue_write(&self, project: &Path, issue: Issue) {
        let checkpoint = Checkpoint::Write {
            project: project.to_path_buf(),
            issue,
        };
        if let Err(e) = self.tx.try_send(checkpoint) {
            tracing::warn!("checkpoint queue full, dropping write checkpoint: {e}");
        }
    }

    /// Enqueue a delete checkpoint; drops it with a warning when full.
    pub fn enqueue_delete(&self, project: &Path, id: IssueId) {
        let checkpoint = Checkpoint::Delete {
            project: project.to_path_buf(),
            id,
        };
        if let Err(e) = self.tx.try_send(checkpoint) {
            tracing::warn!("checkpoint queue full, dropping delete checkpoint: {e}");
        }
    }

    /// Wait until every previously enqueued checkpoint has been processed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Checkpoint::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_worker(store: Arc<dyn IssueStore>, mut rx: mpsc::Receiver<Checkpoint>) {
    while let Some(checkpoint) = rx.recv().await {
        match checkpoint {
            Checkpoint::Write { project, issue } => {
                if let Err(e) = apply_write(store.as_ref(), &project, &issue).await {
                    tracing::warn!(
                        "write checkpoint for {} failed: {e}",
                        issue.id.as_str()
                    );
                }
            }
            Checkpoint::Delete { project, id } => {
                if let Err(e) = apply_delete(store.as_ref(), &project, &id).await {
                    tracing::warn!("delete checkpoint for {} failed: {e}", id.as_str());
                }
            }
            Checkpoint::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn apply_write(
    store: &dyn IssueStore,
    project: &Path,
    issue: &Issue,
) -> crate::error::Result<()> {
    let mut persisted = store.load_issues(project).await?;
    match persisted.iter_mut().find(|i| i.id == issue.id) {
        Some(existing) if existing.last_update >= issue.last_update => Ok(()),
        Some(existing) => {
            *existing = issue.clone();
            store.save_issues(project, &persisted).await
        }
        None => {
            persisted.push(issue.clone());
            store.save_issues(project, &persisted).await
        }
    }
}

async fn apply_delete(
    store: &dyn IssueStore,
    project: &Path,
    id: &IssueId,
) -> crate::error::Result<()> {
    let persisted = store.load_issues(project).await?;
    let remaining: Vec<Issue> = persisted
        .into_iter()
        .filter(|i| i.id != *id)
        .collect();
    store.save_issues(project, &remaining).await
}
