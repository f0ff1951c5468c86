//! Git diff parsing for changed file detection

use anyhow::{Context, Result};
use git2::Diff;
use std::collections::BTreeSet;

use super::ProjectRepo;
use std::path::Path;

/// Git diff operations, reporting project-relative paths
pub struct GitDiff {
    project: ProjectRepo,
}

impl GitDiff {
    /// Open the repository containing the given project directory
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            project: ProjectRepo::discover(path)?,
        })
    }

    /// Files changed on this branch since it left `upstream`
    /// (the three-dot `upstream...HEAD` diff)
    pub fn changed_since(&self, upstream: &str) -> Result<Vec<String>> {
        let repo = &self.project.repo;

        let upstream_commit = repo
            .revparse_single(upstream)
            .with_context(|| format!("Failed to resolve reference: {}", upstream))?
            .peel_to_commit()?;
        let head = repo
            .head()
            .context("Failed to resolve HEAD")?
            .peel_to_commit()?;

        let base = repo
            .merge_base(upstream_commit.id(), head.id())
            .with_context(|| format!("No merge base between {} and HEAD", upstream))?;
        let base_tree = repo.find_commit(base)?.tree()?;
        let head_tree = head.tree()?;

        let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
        Ok(self.collect_paths(&diff))
    }

    /// Tracked files whose index or working tree content differs from HEAD
    pub fn changed_against_head(&self) -> Result<Vec<String>> {
        let repo = &self.project.repo;
        let head_tree = repo
            .head()
            .context("Failed to resolve HEAD")?
            .peel_to_tree()?;

        let diff = repo.diff_tree_to_workdir_with_index(Some(&head_tree), None)?;
        Ok(self.collect_paths(&diff))
    }

    fn collect_paths(&self, diff: &Diff<'_>) -> Vec<String> {
        let mut files: BTreeSet<String> = BTreeSet::new();

        for delta in diff.deltas() {
            let path = delta.new_file().path().or_else(|| delta.old_file().path());
            if let Some(key) = path.and_then(|p| self.project.to_project_path(p)) {
                files.insert(key);
            }
        }

        files.into_iter().collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::commit_all;
    use super::*;
    use git2::Repository;
    use std::fs;
    use tempfile::tempdir;

    fn write(base: &Path, file: &str, content: &str) {
        let path = base.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_changed_since_upstream_merge_base() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        write(dir.path(), "src/a.ts", "export const a = 1;\n");
        let first = commit_all(&repo, "initial");
        repo.branch("upstream", &repo.find_commit(first).unwrap(), false)
            .unwrap();

        write(dir.path(), "src/b.tsx", "export const b = 2;\n");
        write(dir.path(), "src/a.ts", "export const a = 3;\n");
        commit_all(&repo, "feature");

        let diff = GitDiff::new(dir.path()).unwrap();
        let changed = diff.changed_since("upstream").unwrap();
        assert_eq!(changed, vec!["src/a.ts".to_string(), "src/b.tsx".to_string()]);
    }

    #[test]
    fn test_unknown_upstream_is_an_error() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "src/a.ts", "export {};\n");
        commit_all(&repo, "initial");

        let diff = GitDiff::new(dir.path()).unwrap();
        let err = diff.changed_since("origin/does-not-exist").unwrap_err();
        assert!(err.to_string().contains("origin/does-not-exist"));
    }

    #[test]
    fn test_changed_against_head_ignores_untracked() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "src/a.ts", "export const a = 1;\n");
        write(dir.path(), "src/b.ts", "export const b = 1;\n");
        commit_all(&repo, "initial");

        write(dir.path(), "src/a.ts", "console.log('debug');\n");
        write(dir.path(), "src/untracked.ts", "export {};\n");

        let diff = GitDiff::new(dir.path()).unwrap();
        assert_eq!(diff.changed_against_head().unwrap(), vec!["src/a.ts".to_string()]);
    }

    #[test]
    fn test_paths_are_project_relative() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(dir.path(), "web/src/a.ts", "export const a = 1;\n");
        write(dir.path(), "docs/notes.md", "notes\n");
        commit_all(&repo, "initial");

        write(dir.path(), "web/src/a.ts", "export const a = 2;\n");
        write(dir.path(), "docs/notes.md", "more notes\n");

        let diff = GitDiff::new(&dir.path().join("web")).unwrap();
        assert_eq!(diff.changed_against_head().unwrap(), vec!["src/a.ts".to_string()]);
    }
}
