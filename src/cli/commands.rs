//! Command implementations for the `fl` binary.

use crate::cache::{IssueCache, ListFilter, SerializationQueue};
use crate::cli::{CreateArgs, ListArgs, ParentCommands, UpdateArgs};
use crate::config::{DEFAULT_FLEECE_DIR, FleeceConfig, discover_project_root};
use crate::error::{FleeceError, Result};
use crate::git::{CommandRunner, GitCli};
use crate::history::HistoryLog;
use crate::model::{Issue, IssueId, IssuePatch};
use crate::store::{FileIssueStore, IssueStore};
use crate::sync::SyncEngine;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a command needs: resolved project, config, cache, engine.
pub struct App {
    pub project: PathBuf,
    pub config: FleeceConfig,
    pub cache: IssueCache,
    pub engine: SyncEngine,
}

impl App {
    /// Discover the project root and wire up the engine.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` when no fleece workspace is found, or a
    /// config error when the config file is unreadable.
    pub fn open(
        project: Option<&Path>,
        remote: Option<&str>,
        branch: Option<&str>,
    ) -> Result<Self> {
        let project = match project {
            Some(path) => path.to_path_buf(),
            None => discover_project_root(None)?,
        };
        let mut config = FleeceConfig::load(&project)?;
        if let Some(remote) = remote {
            config.remote = remote.to_string();
        }
        if let Some(branch) = branch {
            config.branch = branch.to_string();
        }

        let store: Arc<dyn IssueStore> = Arc::new(FileIssueStore::new(config.fleece_dir.clone()));
        let history = Arc::new(HistoryLog::new(config.fleece_dir.clone()));
        let queue = SerializationQueue::start(Arc::clone(&store), config.queue_capacity);
        let cache = IssueCache::new(Arc::clone(&store), history, queue);
        let runner: Arc<dyn CommandRunner> = Arc::new(GitCli);
        let engine = SyncEngine::new(runner, store, &config);

        Ok(Self {
            project,
            config,
            cache,
            engine,
        })
    }
}

/// Initialize a fleece workspace in the current directory.
///
/// # Errors
///
/// Returns `AlreadyInitialized` unless `force` is set, or an I/O error
/// when the directory cannot be created.
pub fn init(force: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let fleece_dir = cwd.join(DEFAULT_FLEECE_DIR);
    if fleece_dir.exists() && !force {
        return Err(FleeceError::AlreadyInitialized { path: fleece_dir });
    }

    let config = FleeceConfig::default();
    config.save(&cwd)?;
    std::fs::create_dir_all(fleece_dir.join("issues"))?;

    println!("Initialized fleece workspace at {}", fleece_dir.display());
    Ok(())
}

/// Create a new issue.
///
/// # Errors
///
/// Returns a validation error for bad field values or a store error when
/// persisting fails.
pub async fn create(app: &App, args: CreateArgs, json: bool) -> Result<()> {
    let id = generate_issue_id(&app.cache, &app.project, &args.title).await?;
    let mut issue = Issue::new(id, args.title);
    issue.description = args.description;
    issue.tags = args.tags;
    issue.assigned_to = args.assignee;
    if let Some(raw) = &args.issue_type {
        issue.issue_type = raw.parse()?;
    }
    if let Some(raw) = &args.priority {
        issue.priority = raw.parse()?;
    }

    let created = app.cache.create_issue(&app.project, issue).await?;
    if let Some(parent) = &args.parent {
        app.cache
            .add_parent(&app.project, &created.id, &IssueId::from(parent.as_str()))
            .await?;
    }

    if json {
        let issue = app.cache.get_issue(&app.project, &created.id).await?;
        println!("{}", serde_json::to_string_pretty(&issue)?);
    } else {
        println!("{}", created.id);
    }
    Ok(())
}

/// Show one or more issues.
///
/// # Errors
///
/// Returns `IssueNotFound` for any unknown id.
pub async fn show(app: &App, ids: Vec<String>, json: bool) -> Result<()> {
    let mut issues = Vec::with_capacity(ids.len());
    for raw in &ids {
        issues.push(
            app.cache
                .get_issue(&app.project, &IssueId::from(raw.as_str()))
                .await?,
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }
    for issue in &issues {
        print_issue(issue);
    }
    Ok(())
}

/// List issues matching the given criteria.
///
/// # Errors
///
/// Returns a validation error for bad filter values.
pub async fn list(app: &App, args: &ListArgs, json: bool) -> Result<()> {
    let filter = ListFilter {
        status: args.status.as_deref().map(str::parse).transpose()?,
        issue_type: args.issue_type.as_deref().map(str::parse).transpose()?,
        priority: args.priority.as_deref().map(str::parse).transpose()?,
    };
    let issues = app.cache.list_issues(&app.project, &filter).await?;
    print_issue_table(&issues, json, "No matching issues")
}

/// List ready issues.
///
/// # Errors
///
/// Returns an error when the issue set cannot be loaded.
pub async fn ready(app: &App, json: bool) -> Result<()> {
    let issues = app.cache.ready_issues(&app.project).await?;
    print_issue_table(&issues, json, "No ready issues")
}

/// Update an issue.
///
/// # Errors
///
/// Returns `IssueNotFound` for an unknown id or a validation error for
/// bad field values.
pub async fn update(app: &App, args: UpdateArgs, json: bool) -> Result<()> {
    let patch = IssuePatch {
        title: args.title,
        description: args.description,
        status: args.status.as_deref().map(str::parse).transpose()?,
        issue_type: args.issue_type.as_deref().map(str::parse).transpose()?,
        priority: args.priority.as_deref().map(str::parse).transpose()?,
        execution_mode: args.execution_mode.as_deref().map(str::parse).transpose()?,
        tags: if args.tags.is_empty() {
            None
        } else {
            Some(args.tags)
        },
        linked_pr: args.linked_pr,
        working_branch_id: None,
        assigned_to: args.assignee,
    };

    let updated = app
        .cache
        .update_issue(&app.project, &IssueId::from(args.id.as_str()), &patch)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("Updated {}", updated.id);
    }
    Ok(())
}

/// Delete an issue.
///
/// # Errors
///
/// Returns `IssueNotFound` for an unknown id.
pub async fn delete(app: &App, id: &str) -> Result<()> {
    let id = IssueId::from(id);
    app.cache.delete_issue(&app.project, &id).await?;
    println!("Deleted {id}");
    Ok(())
}

/// Add or remove a parent link.
///
/// # Errors
///
/// Returns linking errors (`SelfParent`, `DuplicateParent`,
/// `ParentNotFound`) or `IssueNotFound`.
pub async fn parent(app: &App, command: ParentCommands) -> Result<()> {
    match command {
        ParentCommands::Add { child, parent } => {
            let child = IssueId::from(child.as_str());
            let parent = IssueId::from(parent.as_str());
            app.cache.add_parent(&app.project, &child, &parent).await?;
            println!("Linked {child} under {parent}");
        }
        ParentCommands::Remove { child, parent } => {
            let child = IssueId::from(child.as_str());
            let parent = IssueId::from(parent.as_str());
            app.cache
                .remove_parent(&app.project, &child, &parent)
                .await?;
            println!("Unlinked {child} from {parent}");
        }
    }
    Ok(())
}

/// Report branch and ahead/behind status.
///
/// # Errors
///
/// Never fails; git problems are reported in the output.
pub async fn status(app: &App, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let status = app
        .engine
        .check_branch_status(&app.project, &app.config.branch, &cancel)
        .await;

    if json {
        let value = serde_json::json!({
            "success": status.success,
            "on_correct_branch": status.is_on_correct_branch,
            "current_branch": status.current_branch,
            "ahead": status.ahead,
            "behind": status.behind,
            "error": status.error,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if let Some(error) = &status.error {
        println!("Status check failed: {error}");
    } else if !status.is_on_correct_branch {
        println!(
            "On branch '{}', expected '{}'",
            status.current_branch, app.config.branch
        );
    } else {
        println!(
            "On branch '{}': {} ahead, {} behind {}",
            status.current_branch, status.ahead, status.behind, app.config.remote
        );
    }
    Ok(())
}

/// Full sync: pull, commit, push.
///
/// # Errors
///
/// Returns an error when the cache cannot be reloaded afterwards;
/// protocol failures are reported in the output instead.
pub async fn sync(app: &App, json: bool) -> Result<()> {
    app.cache.flush_checkpoints().await;
    let cancel = CancellationToken::new();
    let result = app
        .engine
        .sync(&app.project, &app.config.branch, &cancel)
        .await;
    app.cache.reload_from_disk(&app.project).await?;

    if json {
        let value = serde_json::json!({
            "success": result.success,
            "files_committed": result.files_committed,
            "issues_merged": result.issues_merged,
            "commits_pulled": result.commits_pulled,
            "pushed": result.pushed,
            "requires_pull_first": result.requires_pull_first,
            "non_fleece_files": result.non_fleece_files,
            "error": result.error(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if result.success {
        info!(
            committed = result.files_committed,
            merged = result.issues_merged,
            pushed = result.pushed,
            "sync complete"
        );
        println!(
            "Synced: {} file(s) committed, {} issue(s) merged, {} commit(s) pulled{}",
            result.files_committed,
            result.issues_merged,
            result.commits_pulled,
            if result.pushed { ", pushed" } else { "" }
        );
    } else if let Some(error) = result.error() {
        println!("Sync failed: {error}");
    }
    Ok(())
}

/// Pull remote issue changes.
///
/// # Errors
///
/// Returns an error when the cache cannot be reloaded afterwards;
/// protocol failures are reported in the output instead.
pub async fn pull(app: &App, full: bool, json: bool) -> Result<()> {
    app.cache.flush_checkpoints().await;
    let cancel = CancellationToken::new();
    let result = if full {
        app.engine
            .pull_changes(&app.project, &app.config.branch, &cancel)
            .await
    } else {
        app.engine
            .pull_fleece_only(&app.project, &app.config.branch, &cancel)
            .await
    };
    app.cache.reload_from_disk(&app.project).await?;

    if json {
        let value = serde_json::json!({
            "success": result.success,
            "issues_merged": result.issues_merged,
            "commits_pulled": result.commits_pulled,
            "non_fleece_files": result.non_fleece_files,
            "error": result.error(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if result.success {
        println!(
            "Pulled {} commit(s), merged {} issue(s)",
            result.commits_pulled, result.issues_merged
        );
    } else if let Some(error) = result.error() {
        println!("Pull failed: {error}");
    }
    Ok(())
}

/// Stash all working-tree changes.
///
/// # Errors
///
/// Never fails; git problems are reported in the output.
pub async fn stash(app: &App) -> Result<()> {
    match app.engine.stash_changes(&app.project).await {
        Ok(()) => println!("Stashed working-tree changes"),
        Err(failure) => println!("Stash failed: {failure}"),
    }
    Ok(())
}

/// Discard working-tree changes.
///
/// # Errors
///
/// Returns an error when the cache cannot be reloaded afterwards.
pub async fn discard(app: &App, all: bool) -> Result<()> {
    let outcome = if all {
        app.engine.discard_changes(&app.project).await
    } else {
        app.engine.discard_non_fleece_changes(&app.project).await
    };
    match outcome {
        Ok(()) => {
            if all {
                app.cache.reload_from_disk(&app.project).await?;
                println!("Discarded all working-tree changes");
            } else {
                println!("Discarded changes outside the issue store");
            }
        }
        Err(failure) => println!("Discard failed: {failure}"),
    }
    Ok(())
}

/// Revert the last issue operation.
///
/// # Errors
///
/// Returns an error when the snapshot cannot be restored.
pub async fn undo(app: &App) -> Result<()> {
    match app.cache.undo(&app.project).await? {
        Some(issues) => println!("Reverted to previous state ({} issue(s))", issues.len()),
        None => println!("Nothing to undo"),
    }
    Ok(())
}

/// Re-apply an undone issue operation.
///
/// # Errors
///
/// Returns an error when the snapshot cannot be restored.
pub async fn redo(app: &App) -> Result<()> {
    match app.cache.redo(&app.project).await? {
        Some(issues) => println!("Re-applied next state ({} issue(s))", issues.len()),
        None => println!("Nothing to redo"),
    }
    Ok(())
}

/// Show the operation history, oldest first.
///
/// # Errors
///
/// Returns an error when the history log cannot be read.
pub async fn history(app: &App, json: bool) -> Result<()> {
    let entries = app.cache.history_entries(&app.project).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No history recorded");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{}  {:<13} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.operation.as_str(),
            entry.description
        );
    }
    Ok(())
}

/// Derive a short stable-prefix id from the title and current time,
/// re-hashing until it is collision free.
async fn generate_issue_id(cache: &IssueCache, project: &Path, title: &str) -> Result<IssueId> {
    let mut nonce = 0u32;
    loop {
        let digest = Sha256::digest(
            format!("{title}\0{}\0{nonce}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
                .as_bytes(),
        );
        let id = IssueId::from(format!("fl-{:x}", digest)[..9].to_string());
        match cache.get_issue(project, &id).await {
            Err(FleeceError::IssueNotFound { .. }) => return Ok(id),
            Err(e) => return Err(e),
            Ok(_) => nonce += 1,
        }
    }
}

fn print_issue_table(issues: &[Issue], json: bool, empty_message: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }
    if issues.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }
    for issue in issues {
        println!(
            "{}  {}  [{}] [{}]  {}",
            issue.id, issue.priority, issue.status, issue.issue_type, issue.title
        );
    }
    Ok(())
}

fn print_issue(issue: &Issue) {
    println!("{}: {}", issue.id, issue.title);
    println!(
        "  {} | {} | {} | {}",
        issue.status, issue.issue_type, issue.priority, issue.execution_mode
    );
    if let Some(description) = &issue.description {
        println!("  {description}");
    }
    if !issue.parents.is_empty() {
        let parents: Vec<String> = issue
            .parents
            .iter()
            .map(|p| p.parent_id.to_string())
            .collect();
        println!("  parents: {}", parents.join(", "));
    }
    if !issue.tags.is_empty() {
        println!("  tags: {}", issue.tags.join(", "));
    }
    if let Some(assigned) = &issue.assigned_to {
        println!("  assigned: {assigned}");
    }
}
