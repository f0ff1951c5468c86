//! Git operations module
//!
//! Provides:
//! - Changed file detection against an upstream merge base or HEAD
//! - Index flag updates (assume-unchanged)

pub mod diff;
pub mod index;

pub use diff::GitDiff;
pub use index::assume_unchanged;

use anyhow::{Context, Result};
use git2::Repository;
use std::fs;
use std::path::{Path, PathBuf};

use crate::graph::normalize_path;

/// A repository together with where the project lives inside it
pub(crate) struct ProjectRepo {
    pub repo: Repository,
    /// Project directory relative to the repository root ("" at the root)
    pub prefix: PathBuf,
}

impl ProjectRepo {
    pub fn discover(base_dir: &Path) -> Result<Self> {
        let repo = Repository::discover(base_dir)
            .with_context(|| format!("Failed to find git repository at {}", base_dir.display()))?;

        let workdir = repo
            .workdir()
            .context("Bare repositories are not supported")?;
        let workdir = fs::canonicalize(workdir)
            .with_context(|| format!("Failed to resolve {}", workdir.display()))?;
        let project = fs::canonicalize(base_dir)
            .with_context(|| format!("Failed to resolve {}", base_dir.display()))?;

        let prefix = project
            .strip_prefix(&workdir)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self { repo, prefix })
    }

    /// Repository-relative path to project-relative key, if inside the project
    pub fn to_project_path(&self, repo_path: &Path) -> Option<String> {
        let relative = repo_path.strip_prefix(&self.prefix).ok()?;
        let key = normalize_path(&relative.to_string_lossy());
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Project-relative path to the repository-relative path the index uses
    pub fn to_repo_path(&self, project_path: &str) -> PathBuf {
        self.prefix.join(normalize_path(project_path))
    }
}
