//! Configuration management for `fleece_rust`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. Environment variables (`FLEECE_REMOTE`, `FLEECE_BRANCH`,
//!    `FLEECE_QUEUE_CAPACITY`)
//! 2. Project config (`<fleece_dir>/config.yaml`)
//! 3. Defaults

use crate::cache::DEFAULT_QUEUE_CAPACITY;
use crate::error::{FleeceError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default repo-relative issue-store directory.
pub const DEFAULT_FLEECE_DIR: &str = ".fleece";
const DEFAULT_REMOTE: &str = "origin";
const DEFAULT_BRANCH: &str = "main";
const CONFIG_FILENAME: &str = "config.yaml";

/// Resolved engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FleeceConfig {
    /// Repo-relative directory holding issues, history, and config.
    pub fleece_dir: String,
    /// Git remote to sync with.
    pub remote: String,
    /// Branch issue commits land on.
    pub branch: String,
    /// Bound of the background checkpoint queue.
    pub queue_capacity: usize,
}

impl Default for FleeceConfig {
    fn default() -> Self {
        Self {
            fleece_dir: DEFAULT_FLEECE_DIR.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl FleeceConfig {
    /// Load configuration for a project, layering the project config file
    /// and environment overrides on top of the defaults.
    ///
    /// A missing config file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load(project: &Path) -> Result<Self> {
        let mut config = Self::default();

        let path = project.join(&config.fleece_dir).join(CONFIG_FILENAME);
        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| FleeceError::Config(format!("{}: {e}", path.display())))?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(remote) = non_empty_env("FLEECE_REMOTE") {
            self.remote = remote;
        }
        if let Some(branch) = non_empty_env("FLEECE_BRANCH") {
            self.branch = branch;
        }
        if let Some(raw) = non_empty_env("FLEECE_QUEUE_CAPACITY") {
            match raw.parse::<usize>() {
                Ok(capacity) if capacity > 0 => self.queue_capacity = capacity,
                _ => tracing::warn!("ignoring invalid FLEECE_QUEUE_CAPACITY: {raw}"),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.fleece_dir.trim().is_empty() || self.fleece_dir.contains("..") {
            return Err(FleeceError::Config(format!(
                "fleece_dir must be a plain repo-relative directory, got '{}'",
                self.fleece_dir
            )));
        }
        if self.remote.trim().is_empty() {
            return Err(FleeceError::Config("remote must not be empty".to_string()));
        }
        if self.branch.trim().is_empty() {
            return Err(FleeceError::Config("branch must not be empty".to_string()));
        }
        Ok(())
    }

    /// Write this configuration into the project's fleece directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, project: &Path) -> Result<()> {
        let dir = project.join(&self.fleece_dir);
        fs::create_dir_all(&dir)?;
        let body = serde_yaml::to_string(self)?;
        fs::write(dir.join(CONFIG_FILENAME), body)?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Discover the project root holding a fleece directory.
///
/// Walks up from `start` (or the CWD) until a directory containing
/// [`DEFAULT_FLEECE_DIR`] is found.
///
/// # Errors
///
/// Returns `NotInitialized` when no fleece directory is found, or an I/O
/// error when the CWD cannot be read.
pub fn discover_project_root(start: Option<&Path>) -> Result<PathBuf> {
    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        if current.join(DEFAULT_FLEECE_DIR).is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    Err(FleeceError::NotInitialized)
}
