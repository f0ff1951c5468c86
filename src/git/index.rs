//! Index flag updates

use anyhow::{Context, Result};
use git2::IndexEntryFlag;
use std::path::Path;

use super::ProjectRepo;

/// Mark a tracked file assume-unchanged
/// (`git update-index --assume-unchanged <file>`)
pub fn assume_unchanged(base_dir: &Path, file: &str) -> Result<()> {
    let project = ProjectRepo::discover(base_dir)?;
    let repo_path = project.to_repo_path(file);

    let mut index = project.repo.index().context("Failed to open git index")?;
    let mut entry = index
        .get_path(&repo_path, 0)
        .with_context(|| format!("{} is not tracked by git", file))?;

    entry.flags |= IndexEntryFlag::VALID.bits();
    index.add(&entry)?;
    index
        .write()
        .context("Failed to write git index")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::diff::test_support::commit_all;
    use git2::Repository;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sets_assume_unchanged_flag() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("applitools.config.js"), "module.exports = {};\n").unwrap();
        commit_all(&repo, "initial");

        assume_unchanged(dir.path(), "applitools.config.js").unwrap();

        let reopened = Repository::open(dir.path()).unwrap();
        let entry = reopened
            .index()
            .unwrap()
            .get_path(Path::new("applitools.config.js"), 0)
            .unwrap();
        assert_ne!(entry.flags & IndexEntryFlag::VALID.bits(), 0);
    }

    #[test]
    fn test_untracked_file_is_an_error() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("a.ts"), "export {};\n").unwrap();
        commit_all(&repo, "initial");

        let err = assume_unchanged(dir.path(), "applitools.config.js").unwrap_err();
        assert!(err.to_string().contains("not tracked"));
    }
}
