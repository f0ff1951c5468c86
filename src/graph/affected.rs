//! Detection of files affected by a change
//!
//! A file is affected when it is one of the changed files, or imports an
//! affected file directly or transitively.

use anyhow::Result;
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Component, Path};

use super::{GraphProvider, ModuleGraph};
use crate::config::Config;
use crate::git::GitDiff;

/// Changed files and everything that depends on them
#[derive(Debug, Clone, Default)]
pub struct ImpactAnalysis {
    pub changed_files: Vec<String>,
    pub impacted_files: Vec<String>,
}

/// Diff against the upstream merge base and resolve the impacted set
pub fn analyze_impact(
    config: &Config,
    base_dir: &Path,
    provider: &GraphProvider,
) -> Result<ImpactAnalysis> {
    let diff = GitDiff::new(base_dir)?;
    let changed = diff.changed_since(&config.git.upstream)?;
    let changed_files = filter_by_extension(&changed, &config.git.changed_extensions);

    println!(
        "{} {} changed file(s) since {}",
        "→".blue(),
        changed_files.len(),
        config.git.upstream.cyan()
    );
    for file in &changed_files {
        println!("  {} {}", "•".dimmed(), file);
    }

    let graph = provider.graph()?;
    let impacted_files = impacted_files(&graph, &changed_files, base_dir);

    println!(
        "{} {} file(s) impacted",
        "→".blue(),
        impacted_files.len()
    );

    Ok(ImpactAnalysis {
        changed_files,
        impacted_files,
    })
}

/// Reverse-reachability closure of `changed_files` over the graph
///
/// Changed files missing from the graph are still impacted as themselves.
/// Paths that fall outside the project are dropped. Order is unspecified.
pub fn impacted_files(graph: &ModuleGraph, changed_files: &[String], base_dir: &Path) -> Vec<String> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = Vec::new();

    for file in changed_files {
        let Some(key) = project_path(file, base_dir) else {
            continue;
        };

        if visited.insert(key.clone()) {
            stack.push(key);
        }

        // Explicit stack: dependency chains can be deeper than the call stack
        while let Some(current) = stack.pop() {
            for dependent in graph.dependents(&current) {
                if visited.insert(dependent.clone()) {
                    stack.push(dependent.clone());
                }
            }
        }
    }

    visited.into_iter().collect()
}

/// Map a path onto the graph's key space: project-relative, forward slashes
fn project_path(file: &str, base_dir: &Path) -> Option<String> {
    let normalized = normalize_path(file);
    let path = Path::new(&normalized);

    let relative = if path.is_absolute() {
        path.strip_prefix(base_dir).ok()?.to_string_lossy().to_string()
    } else {
        normalized.clone()
    };

    let relative = normalize_path(&relative);
    let escapes = Path::new(&relative)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));

    if relative.is_empty() || escapes {
        None
    } else {
        Some(relative)
    }
}

/// Normalize path separators and remove leading ./
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches("./")
        .to_string()
}

pub(crate) fn filter_by_extension(files: &[String], extensions: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|file| {
            Path::new(file.as_str())
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|known| known == e))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
