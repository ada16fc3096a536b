//! Error types and handling for `fleece_rust`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration at the edges
//! - Provides recovery hints for user-facing errors
//! - Sync-protocol outcomes are NOT errors: the engine returns them as
//!   result values (`sync::SyncFailure`) so callers must handle the branch

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `fleece_rust` operations.
#[derive(Error, Debug)]
pub enum FleeceError {
    // === Issue Errors ===
    /// Issue with the specified ID was not found.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// Attempted to create an issue with an ID that already exists.
    #[error("Issue ID collision: {id}")]
    IdCollision { id: String },

    /// The parent edge already exists on the child.
    #[error("Parent already linked: {child} -> {parent}")]
    DuplicateParent { child: String, parent: String },

    /// The parent edge to remove does not exist.
    #[error("Parent not linked: {child} -> {parent}")]
    ParentNotFound { child: String, parent: String },

    /// Self-referential parent edge.
    #[error("Issue cannot be its own parent: {id}")]
    SelfParent { id: String },

    // === Validation Errors ===
    /// Invalid status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid issue type value.
    #[error("Invalid issue type: {issue_type}")]
    InvalidType { issue_type: String },

    /// Priority out of valid range (0-4).
    #[error("Priority must be 0-4, got: {priority}")]
    InvalidPriority { priority: i32 },

    /// Invalid execution mode value.
    #[error("Invalid execution mode: {mode}")]
    InvalidExecutionMode { mode: String },

    /// Issue id does not match the `prefix-suffix` shape.
    #[error("Invalid issue id: {id}")]
    InvalidId { id: String },

    // === Store Errors ===
    /// An issue file could not be parsed.
    #[error("Corrupt issue file '{path}': {reason}")]
    CorruptIssueFile { path: PathBuf, reason: String },

    /// A history snapshot or its metadata could not be read.
    #[error("History error: {reason}")]
    History { reason: String },

    // === Configuration Errors ===
    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fleece workspace not initialized.
    #[error("Fleece not initialized: run 'fl init' first")]
    NotInitialized,

    /// Already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error for edge integrations.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FleeceError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::IssueNotFound { .. }
                | Self::IdCollision { .. }
                | Self::DuplicateParent { .. }
                | Self::ParentNotFound { .. }
                | Self::SelfParent { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidType { .. }
                | Self::InvalidPriority { .. }
                | Self::InvalidExecutionMode { .. }
                | Self::InvalidId { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: fl init"),
            Self::AlreadyInitialized { .. } => Some("Use --force to reinitialize"),
            Self::SelfParent { .. } => Some("An issue cannot be its own parent"),
            Self::InvalidPriority { .. } => {
                Some("Use a priority between 0 (critical) and 4 (backlog)")
            }
            Self::InvalidStatus { .. } => Some(
                "Valid statuses: open, progress, review, complete, closed, archived, deleted",
            ),
            Self::InvalidType { .. } => Some("Valid types: task, bug, feature, chore"),
            Self::InvalidExecutionMode { .. } => Some("Valid modes: series, parallel"),
            Self::InvalidId { .. } => Some("IDs look like 'fl-1a2b3c': prefix, dash, alphanumerics"),
            Self::CorruptIssueFile { .. } => {
                Some("Restore the file from git or remove it and re-sync")
            }
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type using `FleeceError`.
pub type Result<T> = std::result::Result<T, FleeceError>;
