//! End-to-end sync protocol scenarios against a scripted git runner.
//!
//! The fake runner answers each git subcommand from a queue of canned
//! outputs and records every invocation, so the tests can assert both the
//! outcome and the exact protocol steps (stash drop vs pop, no push after
//! a block, and so on). Issue files live in a real temp directory; only
//! git itself is simulated.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fleece_rust::config::FleeceConfig;
use fleece_rust::git::{CommandOutput, CommandRunner};
use fleece_rust::model::{Issue, IssueId};
use fleece_rust::store::{FileIssueStore, IssueStore};
use fleece_rust::sync::{SyncEngine, SyncFailure};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type FfHook = Box<dyn FnOnce() + Send>;

/// Scripted command runner. Unscripted subcommands succeed with empty
/// output, which matches git's quiet happy path.
#[derive(Default)]
struct FakeRunner {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    invocations: Mutex<Vec<String>>,
    on_fast_forward: Mutex<Option<FfHook>>,
}

impl FakeRunner {
    fn script(&self, key: &str, outputs: Vec<CommandOutput>) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), outputs.into());
    }

    /// Run a closure when `merge --ff-only` executes, simulating the
    /// working-tree update a real fast-forward performs.
    fn on_fast_forward(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_fast_forward.lock().unwrap() = Some(Box::new(hook));
    }

    fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    fn called(&self, prefix: &str) -> bool {
        self.invocations()
            .iter()
            .any(|line| line.starts_with(prefix))
    }
}

fn command_key(args: &[&str]) -> String {
    match args.first().copied() {
        Some("stash") => format!("stash {}", args.get(1).copied().unwrap_or_default()),
        Some("merge") if args.get(1) == Some(&"--ff-only") => "merge --ff-only".to_string(),
        Some("merge") if args.get(1) == Some(&"--abort") => "merge --abort".to_string(),
        Some(subcommand) => subcommand.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, _tool: &str, args: &[&str], _cwd: &Path) -> CommandOutput {
        self.invocations.lock().unwrap().push(args.join(" "));

        let key = command_key(args);
        if key == "merge --ff-only" {
            if let Some(hook) = self.on_fast_forward.lock().unwrap().take() {
                hook();
            }
        }

        self.responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

struct Harness {
    temp: TempDir,
    runner: Arc<FakeRunner>,
    store: Arc<FileIssueStore>,
    engine: SyncEngine,
}

fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let store = Arc::new(FileIssueStore::new(".fleece"));
    let config = FleeceConfig::default();
    let engine = SyncEngine::new(
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        Arc::clone(&store) as Arc<dyn IssueStore>,
        &config,
    );
    runner.script("rev-parse", vec![CommandOutput::ok("main\n")]);
    Harness {
        temp,
        runner,
        store,
        engine,
    }
}

fn issue_at(id: &str, title: &str, secs: i64) -> Issue {
    let mut issue = Issue::new(id, title);
    issue.created_at = Utc.timestamp_opt(secs, 0).unwrap();
    issue.last_update = issue.created_at;
    issue
}

/// Write an issue file directly, bypassing the store, the way a git
/// fast-forward would.
fn write_issue_file(project: &Path, name: &str, issue: &Issue) {
    let dir = project.join(".fleece").join("issues");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(name),
        serde_json::to_vec_pretty(issue).unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn pull_merges_dirty_issue_store_and_drops_stash() {
    let h = harness();
    let project = h.temp.path();

    // Local working copy: issue A edited locally (newer than remote).
    let mut local_a = issue_at("fl-a", "Local title", 1_000);
    local_a.last_update = Utc.timestamp_opt(3_000, 0).unwrap();
    local_a.tags = vec!["local".to_string()];
    h.store
        .save_issues(project, std::slice::from_ref(&local_a))
        .await
        .unwrap();

    h.runner.script(
        "status",
        vec![
            CommandOutput::ok(" M .fleece/issues/issue-local.json\n"),
            CommandOutput::ok(" M .fleece/issues/issue-local.json\n"),
        ],
    );
    h.runner
        .script("rev-list", vec![CommandOutput::ok("0\t2\n")]);

    // The fast-forward replaces the issue store with the remote content:
    // an older copy of A carrying a remote-only tag, plus a new issue B.
    let project_owned = project.to_path_buf();
    h.runner.on_fast_forward(move || {
        let dir = project_owned.join(".fleece").join("issues");
        for entry in std::fs::read_dir(&dir).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }
        let mut remote_a = issue_at("fl-a", "Remote title", 1_000);
        remote_a.last_update = Utc.timestamp_opt(2_000, 0).unwrap();
        remote_a.tags = vec!["remote".to_string()];
        write_issue_file(&project_owned, "issue-remote-a.json", &remote_a);
        write_issue_file(
            &project_owned,
            "issue-remote-b.json",
            &issue_at("fl-b", "Remote only", 2_500),
        );
    });

    let cancel = CancellationToken::new();
    let result = h.engine.pull_fleece_only(project, "main", &cancel).await;

    assert!(result.success, "pull failed: {:?}", result.failure);
    assert_eq!(result.commits_pulled, 2);
    assert_eq!(result.issues_merged, 1);

    // The merged set keeps the newer local title, unions the tags, and
    // includes the remote-only issue.
    h.store.invalidate(project).await;
    let merged = h.store.load_issues(project).await.unwrap();
    assert_eq!(merged.len(), 2);
    let a = merged
        .iter()
        .find(|i| i.id == IssueId::from("fl-a"))
        .unwrap();
    assert_eq!(a.title, "Local title");
    assert_eq!(
        a.tags,
        vec!["local".to_string(), "remote".to_string()]
    );
    assert!(merged.iter().any(|i| i.id == IssueId::from("fl-b")));

    // Local edits travel through the merge, never through a stash pop.
    assert!(h.runner.called("stash push"));
    assert!(h.runner.called("stash drop"));
    assert!(!h.runner.called("stash pop"));
}

#[tokio::test]
async fn failed_fast_forward_restores_stash_and_reports_divergence() {
    let h = harness();
    let project = h.temp.path();

    h.store
        .save_issues(project, &[issue_at("fl-a", "Local", 1_000)])
        .await
        .unwrap();
    h.runner.script(
        "status",
        vec![
            CommandOutput::ok(" M .fleece/issues/issue-x.json\n"),
            CommandOutput::ok(" M .fleece/issues/issue-x.json\n"),
        ],
    );
    h.runner
        .script("rev-list", vec![CommandOutput::ok("1\t1\n")]);
    h.runner.script(
        "merge --ff-only",
        vec![CommandOutput::failed(
            "fatal: Not possible to fast-forward, aborting.",
        )],
    );

    let cancel = CancellationToken::new();
    let result = h.engine.pull_fleece_only(project, "main", &cancel).await;

    assert!(!result.success);
    assert!(matches!(
        result.failure,
        Some(SyncFailure::FastForwardFailed { .. })
    ));
    assert!(result.error().unwrap().contains("diverged"));
    assert!(h.runner.called("stash pop"), "stash must be restored");
    assert!(!h.runner.called("stash drop"));
}

#[tokio::test]
async fn non_fleece_changes_block_sync_before_any_commit() {
    let h = harness();
    let project = h.temp.path();

    h.runner.script(
        "status",
        vec![CommandOutput::ok(
            " M src/main.rs\n M .fleece/issues/issue-x.json\n",
        )],
    );
    h.runner
        .script("rev-list", vec![CommandOutput::ok("0\t1\n")]);

    let cancel = CancellationToken::new();
    let result = h.engine.sync(project, "main", &cancel).await;

    assert!(!result.success);
    assert_eq!(result.non_fleece_files, vec!["src/main.rs".to_string()]);
    let failure = result.failure.unwrap();
    assert!(failure.is_recoverable());
    assert!(failure.to_string().contains("src/main.rs"));

    assert!(!h.runner.called("stash"));
    assert!(!h.runner.called("commit"));
    assert!(!h.runner.called("push"));
}

#[tokio::test]
async fn rejected_push_asks_for_a_pull_first() {
    let h = harness();
    let project = h.temp.path();

    h.runner.script("status", vec![CommandOutput::ok("")]);
    h.runner.script(
        "rev-list",
        vec![CommandOutput::ok("1\t0\n"), CommandOutput::ok("1\t0\n")],
    );
    h.runner.script(
        "push",
        vec![CommandOutput::failed(
            "! [rejected] main -> main (fetch first)\nerror: failed to push some refs",
        )],
    );

    let cancel = CancellationToken::new();
    let result = h.engine.sync(project, "main", &cancel).await;

    assert!(!result.success);
    assert!(!result.pushed);
    assert!(result.requires_pull_first);
    assert!(matches!(
        result.failure,
        Some(SyncFailure::PushRejected { .. })
    ));
}

#[tokio::test]
async fn clean_ahead_sync_commits_and_pushes() {
    let h = harness();
    let project = h.temp.path();

    // Two dirty issue files, nothing else.
    h.runner.script(
        "status",
        vec![
            CommandOutput::ok(
                " M .fleece/issues/issue-x.json\n?? .fleece/issues/issue-y.json\n",
            ),
            CommandOutput::ok(
                " M .fleece/issues/issue-x.json\n?? .fleece/issues/issue-y.json\n",
            ),
        ],
    );
    h.runner.script(
        "rev-list",
        vec![CommandOutput::ok("0\t0\n"), CommandOutput::ok("1\t0\n")],
    );

    let cancel = CancellationToken::new();
    let result = h.engine.sync(project, "main", &cancel).await;

    assert!(result.success, "sync failed: {:?}", result.failure);
    assert_eq!(result.files_committed, 2);
    assert_eq!(result.commits_pulled, 0);
    assert!(result.pushed);

    let invocations = h.runner.invocations();
    assert!(invocations.iter().any(|l| l.starts_with("add -- .fleece")));
    assert!(invocations.iter().any(|l| l.starts_with("commit -m")));
    assert!(invocations.iter().any(|l| l.starts_with("push origin main")));
}

#[tokio::test]
async fn wrong_branch_stops_everything() {
    let h = harness();
    let project = h.temp.path();
    h.runner
        .script("rev-parse", vec![CommandOutput::ok("topic\n")]);

    let cancel = CancellationToken::new();
    let result = h.engine.sync(project, "main", &cancel).await;

    assert!(!result.success);
    match result.failure {
        Some(SyncFailure::BranchMismatch { expected, actual }) => {
            assert_eq!(expected, "main");
            assert_eq!(actual, "topic");
        }
        other => panic!("expected BranchMismatch, got {other:?}"),
    }
    assert!(!h.runner.called("fetch"));
    assert!(!h.runner.called("push"));
}

#[tokio::test]
async fn branch_name_comparison_ignores_case() {
    let h = harness();
    let project = h.temp.path();
    h.runner
        .script("rev-parse", vec![CommandOutput::ok("Main\n")]);
    h.runner
        .script("rev-list", vec![CommandOutput::ok("0\t0\n")]);

    let cancel = CancellationToken::new();
    let status = h.engine.check_branch_status(project, "main", &cancel).await;
    assert!(status.success);
    assert!(status.is_on_correct_branch);
}

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let h = harness();
    let project = h.temp.path();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let status = h.engine.check_branch_status(project, "main", &cancel).await;
    assert!(!status.success);
    assert!(status.error.unwrap().contains("cancelled"));
    assert!(h.runner.invocations().is_empty());
}

#[tokio::test]
async fn full_pull_resolves_issue_store_conflicts_itself() {
    let h = harness();
    let project = h.temp.path();

    let mut local = issue_at("fl-a", "Local title", 1_000);
    local.last_update = Utc.timestamp_opt(3_000, 0).unwrap();
    h.store
        .save_issues(project, std::slice::from_ref(&local))
        .await
        .unwrap();

    h.runner
        .script("rev-list", vec![CommandOutput::ok("1\t1\n")]);

    // The engine keeps the local set in memory before the checkout, so
    // replacing the on-disk content up front emulates what
    // `checkout origin/main -- .fleece` would do.
    let dir = project.join(".fleece").join("issues");
    for entry in std::fs::read_dir(&dir).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
    let mut remote = issue_at("fl-a", "Remote title", 1_000);
    remote.last_update = Utc.timestamp_opt(2_000, 0).unwrap();
    write_issue_file(project, "issue-remote-a.json", &remote);

    // The repository merge conflicts, but only inside the issue store.
    h.runner.script(
        "merge",
        vec![CommandOutput::failed(
            "CONFLICT (content): Merge conflict in .fleece/issues/issue-remote-a.json",
        )],
    );
    h.runner.script(
        "diff",
        vec![CommandOutput::ok(".fleece/issues/issue-remote-a.json\n")],
    );

    let cancel = CancellationToken::new();
    let result = h.engine.pull_changes(project, "main", &cancel).await;

    assert!(result.success, "pull failed: {:?}", result.failure);
    assert_eq!(result.issues_merged, 1);
    assert!(!h.runner.called("merge --abort"));

    // Merge commit was completed, not aborted.
    assert!(h.runner.called("commit --no-edit"));
}

#[tokio::test]
async fn full_pull_aborts_on_conflicts_outside_the_issue_store() {
    let h = harness();
    let project = h.temp.path();

    h.runner
        .script("rev-list", vec![CommandOutput::ok("1\t1\n")]);
    h.runner.script(
        "merge",
        vec![CommandOutput::failed(
            "CONFLICT (content): Merge conflict in src/lib.rs",
        )],
    );
    h.runner
        .script("diff", vec![CommandOutput::ok("src/lib.rs\n")]);

    let cancel = CancellationToken::new();
    let result = h.engine.pull_changes(project, "main", &cancel).await;

    assert!(!result.success);
    assert!(matches!(
        result.failure,
        Some(SyncFailure::NonFleeceChanges { .. })
    ));
    assert_eq!(result.non_fleece_files, vec!["src/lib.rs".to_string()]);
    assert!(h.runner.called("merge --abort"));
}

/// Store wrapper whose saves can be switched to fail, emulating a full
/// or read-only disk mid-pull.
struct FlakySaveStore {
    inner: FileIssueStore,
    fail_saves: AtomicBool,
}

#[async_trait]
impl IssueStore for FlakySaveStore {
    async fn load_issues(&self, project: &Path) -> fleece_rust::Result<Vec<Issue>> {
        self.inner.load_issues(project).await
    }

    async fn save_issues(
        &self,
        project: &Path,
        issues: &[Issue],
    ) -> fleece_rust::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("No space left on device").into());
        }
        self.inner.save_issues(project, issues).await
    }

    async fn invalidate(&self, project: &Path) {
        self.inner.invalidate(project).await;
    }
}

#[tokio::test]
async fn failed_persist_keeps_the_stash_for_recovery() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let store = Arc::new(FlakySaveStore {
        inner: FileIssueStore::new(".fleece"),
        fail_saves: AtomicBool::new(false),
    });
    let config = FleeceConfig::default();
    let engine = SyncEngine::new(
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        Arc::clone(&store) as Arc<dyn IssueStore>,
        &config,
    );
    runner.script("rev-parse", vec![CommandOutput::ok("main\n")]);
    let project = temp.path();

    store
        .save_issues(project, &[issue_at("fl-a", "Local", 1_000)])
        .await
        .unwrap();
    runner.script(
        "status",
        vec![
            CommandOutput::ok(" M .fleece/issues/issue-x.json\n"),
            CommandOutput::ok(" M .fleece/issues/issue-x.json\n"),
        ],
    );
    runner.script("rev-list", vec![CommandOutput::ok("0\t1\n")]);

    // The merged set cannot be written back.
    store.fail_saves.store(true, Ordering::SeqCst);

    let cancel = CancellationToken::new();
    let result = engine.pull_fleece_only(project, "main", &cancel).await;

    assert!(!result.success);
    assert!(matches!(
        result.failure,
        Some(SyncFailure::PersistFailed { .. })
    ));

    // The local edits survive in the stash: neither dropped nor popped.
    assert!(runner.called("stash push"));
    assert!(!runner.called("stash drop"));
    assert!(!runner.called("stash pop"));
}

#[tokio::test]
async fn stale_checkpoint_ordering_is_preserved_under_concurrent_sync() {
    // Two concurrent sync calls on the same project must serialize; the
    // runner sees a strict sequence, never interleaved protocols.
    let h = harness();
    let project = h.temp.path();

    h.runner.script(
        "rev-parse",
        vec![CommandOutput::ok("main\n"), CommandOutput::ok("main\n")],
    );
    h.runner.script(
        "rev-list",
        vec![
            CommandOutput::ok("0\t0\n"),
            CommandOutput::ok("0\t0\n"),
            CommandOutput::ok("0\t0\n"),
            CommandOutput::ok("0\t0\n"),
        ],
    );

    let engine = Arc::new(h.engine);
    let cancel = CancellationToken::new();
    let first = {
        let engine = Arc::clone(&engine);
        let project = project.to_path_buf();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.sync(&project, "main", &cancel).await })
    };
    let second = {
        let engine = Arc::clone(&engine);
        let project = project.to_path_buf();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.sync(&project, "main", &cancel).await })
    };

    let (a, b) = (first.await.unwrap(), second.await.unwrap());
    assert!(a.success);
    assert!(b.success);

    // Each protocol starts with rev-parse; with serialization the second
    // rev-parse can only appear after the first sync's final rev-list.
    let invocations = h.runner.invocations();
    let rev_parse_positions: Vec<usize> = invocations
        .iter()
        .enumerate()
        .filter(|(_, l)| l.starts_with("rev-parse"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(rev_parse_positions.len(), 2);
    let between = &invocations[rev_parse_positions[0]..rev_parse_positions[1]];
    assert!(
        between.iter().filter(|l| l.starts_with("rev-list")).count() >= 2,
        "first sync must finish before the second starts: {invocations:?}"
    );
}
