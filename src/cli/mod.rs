//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Git-backed collaborative issue tracker
#[derive(Parser, Debug)]
#[command(name = "fl", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (auto-discovered from the CWD if not set)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Git remote override (default from config)
    #[arg(long, global = true)]
    pub remote: Option<String>,

    /// Branch override (default from config)
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a fleece workspace in the current repository
    Init {
        /// Overwrite an existing workspace
        #[arg(long)]
        force: bool,
    },

    /// Create a new issue
    Create(CreateArgs),

    /// Show issue details
    Show {
        /// Issue IDs
        ids: Vec<String>,
    },

    /// List issues
    List(ListArgs),

    /// List ready issues (active, no unsatisfied parents)
    Ready,

    /// Update an issue
    Update(UpdateArgs),

    /// Delete an issue
    Delete {
        /// Issue ID
        id: String,
    },

    /// Manage parent links
    Parent {
        #[command(subcommand)]
        command: ParentCommands,
    },

    /// Show branch and sync status
    Status,

    /// Pull, commit, and push issue changes
    Sync,

    /// Pull remote issue changes
    Pull {
        /// Merge the whole repository, not just the issue store
        #[arg(long)]
        full: bool,
    },

    /// Stash all working-tree changes
    Stash,

    /// Discard working-tree changes
    Discard {
        /// Discard everything, not just changes outside the issue store
        #[arg(long)]
        all: bool,
    },

    /// Revert the last issue operation
    Undo,

    /// Re-apply an undone issue operation
    Redo,

    /// Show the operation history
    History,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Issue title
    pub title: String,

    /// Detailed description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Issue type (task, bug, feature, chore)
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Priority 0-4 (or P0-P4)
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Parent issue to link under
    #[arg(long)]
    pub parent: Option<String>,

    /// Assignee
    #[arg(short, long)]
    pub assignee: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Filter by status (default hides terminal statuses)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by issue type
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Filter by priority
    #[arg(short, long)]
    pub priority: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Issue ID
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New status
    #[arg(short, long)]
    pub status: Option<String>,

    /// New issue type
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Execution mode for children (series, parallel)
    #[arg(long)]
    pub execution_mode: Option<String>,

    /// Replace tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Linked pull request reference
    #[arg(long)]
    pub linked_pr: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ParentCommands {
    /// Link a child issue under a parent
    Add {
        /// Child issue ID
        child: String,
        /// Parent issue ID
        parent: String,
    },
    /// Remove a parent link
    Remove {
        /// Child issue ID
        child: String,
        /// Parent issue ID
        parent: String,
    },
}
