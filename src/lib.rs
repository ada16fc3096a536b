//! `fleece_rust`: git-backed collaborative issue tracking.
//!
//! Issues live as content-addressed JSON files inside the repository and
//! flow between clones through ordinary git commits. The crate layers:
//!
//! - [`model`]: issue entities and patches
//! - [`store`]: content-addressed file persistence
//! - [`cache`]: write-through in-memory state plus background checkpoints
//! - [`merge`]: deterministic field-level issue merging
//! - [`sync`]: the git synchronization protocol
//! - [`history`]: undo/redo snapshot log
//! - [`git`]: the external command boundary
//! - [`cli`]: the `fl` command-line surface

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod history;
pub mod logging;
pub mod merge;
pub mod model;
pub mod store;
pub mod sync;

pub use error::{FleeceError, Result};
