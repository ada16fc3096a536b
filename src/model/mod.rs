//! Core data types for `fleece_rust`.
//!
//! This module defines the fundamental types used throughout the engine:
//! - `Issue` - The core work item
//! - `IssueId` - Case-insensitive issue identifier
//! - `Status` - Issue lifecycle states
//! - `IssueType` - Categories of issues
//! - `ExecutionMode` - How an issue's children are intended to run
//! - `ParentRef` - Dependency edge to a parent issue
//! - `IssuePatch` - Copy-with partial update

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Issue ids look like `fl-1a2b3c`: an alphabetic prefix, a dash, then
/// letters and digits.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+-[A-Za-z0-9]+$").expect("static pattern compiles"));

/// Case-insensitive issue identifier.
///
/// Equality, hashing, and ordering ignore ASCII case; the original casing
/// is preserved for display and serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id matches the `prefix-suffix` shape.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        ID_PATTERN.is_match(&self.0)
    }
}

impl PartialEq for IssueId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for IssueId {}

impl Hash for IssueId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl Ord for IssueId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .bytes()
            .map(|b| b.to_ascii_lowercase())
            .cmp(other.0.bytes().map(|b| b.to_ascii_lowercase()))
    }
}

impl PartialOrd for IssueId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IssueId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for IssueId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Issue lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Progress,
    Review,
    Complete,
    Closed,
    Archived,
    Deleted,
}

impl Status {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Progress => "progress",
            Self::Review => "review",
            Self::Complete => "complete",
            Self::Closed => "closed",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }

    /// Terminal statuses are hidden from default listing and never ready.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Closed | Self::Archived | Self::Deleted
        )
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Progress | Self::Review)
    }

    /// Whether an issue in this status satisfies its children's dependency.
    #[must_use]
    pub const fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Complete | Self::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::FleeceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "progress" | "in_progress" => Ok(Self::Progress),
            "review" => Ok(Self::Review),
            "complete" => Ok(Self::Complete),
            "closed" => Ok(Self::Closed),
            "archived" => Ok(Self::Archived),
            "deleted" => Ok(Self::Deleted),
            other => Err(crate::error::FleeceError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Issue type category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Chore,
}

impl IssueType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Chore => "chore",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = crate::error::FleeceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "chore" => Ok(Self::Chore),
            other => Err(crate::error::FleeceError::InvalidType {
                issue_type: other.to_string(),
            }),
        }
    }
}

/// How an issue's children are intended to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Series,
    Parallel,
}

impl ExecutionMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Parallel => "parallel",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = crate::error::FleeceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "series" => Ok(Self::Series),
            "parallel" => Ok(Self::Parallel),
            other => Err(crate::error::FleeceError::InvalidExecutionMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Issue priority (0=Critical, 4=Backlog).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const BACKLOG: Self = Self(4);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = crate::error::FleeceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let val = s.strip_prefix('P').unwrap_or(&s);

        match val.parse::<i32>() {
            Ok(p) if (0..=4).contains(&p) => Ok(Self(p)),
            _ => Err(crate::error::FleeceError::InvalidPriority {
                priority: val.parse().unwrap_or(-1),
            }),
        }
    }
}

/// Dependency edge to a parent issue.
///
/// Parents form a DAG; acyclicity is enforced by a collaborator, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub parent_id: IssueId,

    /// Position among siblings under the same parent.
    #[serde(default)]
    pub sort_order: i32,
}

/// The primary issue entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Unique case-insensitive ID (e.g., "fl-abc123").
    pub id: IssueId,

    /// Title (short summary).
    pub title: String,

    /// Detailed description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Issue type (task, bug, feature, chore).
    #[serde(default)]
    pub issue_type: IssueType,

    /// Workflow status.
    #[serde(default)]
    pub status: Status,

    /// Priority (0=Critical, 4=Backlog).
    #[serde(default)]
    pub priority: Priority,

    /// How children are intended to run.
    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Parent dependency edges, ordered by `sort_order`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<ParentRef>,

    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Related issues (non-blocking links).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_issues: Vec<IssueId>,

    /// Linked pull request reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_pr: Option<String>,

    /// Branch an agent is working on for this issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_branch_id: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp; drives merge precedence.
    pub last_update: DateTime<Utc>,

    /// Creator username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Assigned user or agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl Issue {
    /// Create a new open issue with defaults for everything else.
    #[must_use]
    pub fn new(id: impl Into<IssueId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            issue_type: IssueType::default(),
            status: Status::default(),
            priority: Priority::default(),
            execution_mode: ExecutionMode::default(),
            parents: Vec::new(),
            tags: Vec::new(),
            linked_issues: Vec::new(),
            linked_pr: None,
            working_branch_id: None,
            created_at: now,
            last_update: now,
            created_by: None,
            assigned_to: None,
        }
    }

    /// Compute the deterministic content hash for this issue.
    ///
    /// Covers every persisted field, so any content change produces a new
    /// hash (and thus a new content-addressed filename).
    #[must_use]
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = Sha256::new();

        // Helper to update with null separator
        let mut update = |s: &str| {
            hasher.update(s.as_bytes());
            hasher.update([0]);
        };

        update(self.id.as_str());
        update(&self.title);
        update(self.description.as_deref().unwrap_or(""));
        update(self.issue_type.as_str());
        update(self.status.as_str());
        update(&self.priority.0.to_string());
        update(self.execution_mode.as_str());
        for parent in &self.parents {
            update(parent.parent_id.as_str());
            update(&parent.sort_order.to_string());
        }
        for tag in &self.tags {
            update(tag);
        }
        for linked in &self.linked_issues {
            update(linked.as_str());
        }
        update(self.linked_pr.as_deref().unwrap_or(""));
        update(self.working_branch_id.as_deref().unwrap_or(""));
        update(&self.created_at.to_rfc3339());
        update(&self.last_update.to_rfc3339());
        update(self.created_by.as_deref().unwrap_or(""));
        hasher.update(self.assigned_to.as_deref().unwrap_or("").as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Apply a partial update, carrying unspecified fields over unchanged.
    ///
    /// `last_update` is always bumped to `now`.
    #[must_use]
    pub fn apply(&self, patch: &IssuePatch, now: DateTime<Utc>) -> Self {
        let mut updated = self.clone();
        if let Some(title) = &patch.title {
            updated.title = title.clone();
        }
        if let Some(description) = &patch.description {
            updated.description = Some(description.clone());
        }
        if let Some(issue_type) = &patch.issue_type {
            updated.issue_type = issue_type.clone();
        }
        if let Some(status) = &patch.status {
            updated.status = status.clone();
        }
        if let Some(priority) = patch.priority {
            updated.priority = priority;
        }
        if let Some(execution_mode) = patch.execution_mode {
            updated.execution_mode = execution_mode;
        }
        if let Some(tags) = &patch.tags {
            updated.tags = tags.clone();
        }
        if let Some(linked_pr) = &patch.linked_pr {
            updated.linked_pr = Some(linked_pr.clone());
        }
        if let Some(working_branch_id) = &patch.working_branch_id {
            updated.working_branch_id = Some(working_branch_id.clone());
        }
        if let Some(assigned_to) = &patch.assigned_to {
            updated.assigned_to = Some(assigned_to.clone());
        }
        updated.last_update = now;
        updated
    }
}

/// Partial issue update with copy-with semantics.
///
/// Unset fields leave the issue unchanged; see `Issue::apply`.
#[derive(Debug, Clone, Default)]
pub struct IssuePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub issue_type: Option<IssueType>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub execution_mode: Option<ExecutionMode>,
    pub tags: Option<Vec<String>>,
    pub linked_pr: Option<String>,
    pub working_branch_id: Option<String>,
    pub assigned_to: Option<String>,
}
