//! Graph module for change-impact analysis
//!
//! Provides:
//! - Module dependency graph (dependent -> dependencies) over source files
//! - Static import scanning with tsconfig path aliases
//! - On-disk graph cache
//! - Affected file detection over reverse dependencies

pub mod affected;
pub mod cache;
pub mod scan;

pub use affected::{analyze_impact, impacted_files, normalize_path, ImpactAnalysis};

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::config::GraphConfig;

/// Directed graph of file-level imports, keyed by project-relative path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleGraph {
    dependencies: BTreeMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl ModuleGraph {
    /// Build a graph from `dependent -> [dependencies]` edges. Duplicate
    /// dependencies collapse, order within a list is not significant.
    pub fn from_edges<I, K, V>(edges: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (file, deps) in edges {
            let entry = dependencies.entry(file.into()).or_default();
            entry.extend(deps.into_iter().map(Into::into));
        }

        for deps in dependencies.values_mut() {
            let unique: BTreeSet<String> = deps.drain(..).collect();
            deps.extend(unique);
        }

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for (file, deps) in &dependencies {
            for dep in deps {
                dependents.entry(dep.clone()).or_default().push(file.clone());
            }
        }

        Self {
            dependencies,
            dependents,
        }
    }

    /// Files directly imported by `file`
    pub fn dependencies(&self, file: &str) -> &[String] {
        self.dependencies.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files that directly import `file`
    pub fn dependents(&self, file: &str) -> &[String] {
        self.dependents.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, file: &str) -> bool {
        self.dependencies.contains_key(file) || self.dependents.contains_key(file)
    }

    pub fn edges(&self) -> &BTreeMap<String, Vec<String>> {
        &self.dependencies
    }

    /// Number of files with an entry in the graph
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }
}

/// Where the provider got its graph from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSource {
    Memory,
    Cache,
    Scan,
}

/// Builds or loads the module graph once per invocation
///
/// The graph is held behind an `Arc` and handed out read-only; callers
/// thread it through impact analysis explicitly.
pub struct GraphProvider {
    base_dir: PathBuf,
    config: GraphConfig,
    graph: OnceLock<Arc<ModuleGraph>>,
}

impl GraphProvider {
    pub fn new(base_dir: &Path, config: &GraphConfig) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            config: config.clone(),
            graph: OnceLock::new(),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.base_dir.join(&self.config.cache)
    }

    /// Return the graph, loading the cache or scanning sources on first use
    pub fn graph(&self) -> Result<Arc<ModuleGraph>> {
        self.graph_with_source().map(|(graph, _)| graph)
    }

    pub fn graph_with_source(&self) -> Result<(Arc<ModuleGraph>, GraphSource)> {
        if let Some(graph) = self.graph.get() {
            println!("{} Dependency graph already in memory", "✓".green());
            return Ok((graph.clone(), GraphSource::Memory));
        }

        let (graph, source) = self.load_or_build()?;
        let graph = self.graph.get_or_init(|| Arc::new(graph)).clone();

        Ok((graph, source))
    }

    /// Delete the cache file so the next load rescans sources
    pub fn invalidate_cache(&self) -> Result<bool> {
        let path = self.cache_path();
        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove graph cache: {}", path.display()))?;
        Ok(true)
    }

    fn load_or_build(&self) -> Result<(ModuleGraph, GraphSource)> {
        let cache_path = self.cache_path();

        if let Some(graph) = cache::load(&cache_path)? {
            println!(
                "{} Fetched dependency graph from cache ({} files)",
                "✓".green(),
                graph.len()
            );
            return Ok((graph, GraphSource::Cache));
        }

        println!(
            "{} Dependency graph not found, scanning {}...",
            "→".blue(),
            self.config.roots.join(", ").dimmed()
        );

        let graph = scan::scan_project(&self.base_dir, &self.config)
            .context("Failed to build module graph")?;

        cache::save(&cache_path, &graph)?;

        println!(
            "{} Dependency graph generated and cached: {} files, {} imports",
            "✓".green(),
            graph.len(),
            graph.edge_count()
        );

        Ok((graph, GraphSource::Scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn graph_config(cache: &str) -> GraphConfig {
        GraphConfig {
            roots: vec!["src".to_string()],
            extensions: vec!["ts".to_string(), "tsx".to_string()],
            cache: cache.to_string(),
            tsconfig: "tsconfig.json".to_string(),
        }
    }

    #[test]
    fn test_from_edges_builds_reverse_index() {
        let graph = ModuleGraph::from_edges(vec![
            ("src/b.ts", vec!["src/a.ts"]),
            ("src/c.ts", vec!["src/b.ts", "src/a.ts", "src/b.ts"]),
        ]);

        assert_eq!(graph.dependencies("src/c.ts"), ["src/a.ts", "src/b.ts"]);
        let mut dependents = graph.dependents("src/a.ts").to_vec();
        dependents.sort();
        assert_eq!(dependents, vec!["src/b.ts", "src/c.ts"]);
        assert!(graph.dependents("src/c.ts").is_empty());
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.contains("src/a.ts"));
    }

    #[test]
    fn test_provider_scans_then_caches() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.ts"), "export const a = 1;\n").unwrap();
        fs::write(dir.path().join("src/b.ts"), "import { a } from './a';\n").unwrap();

        let provider = GraphProvider::new(dir.path(), &graph_config("graph.json"));
        let (graph, source) = provider.graph_with_source().unwrap();
        assert_eq!(source, GraphSource::Scan);
        assert_eq!(graph.dependencies("src/b.ts"), ["src/a.ts"]);
        assert!(dir.path().join("graph.json").exists());

        let (again, source) = provider.graph_with_source().unwrap();
        assert_eq!(source, GraphSource::Memory);
        assert!(Arc::ptr_eq(&graph, &again));

        // A fresh provider trusts the cache even when sources change
        fs::write(dir.path().join("src/c.ts"), "import './b';\n").unwrap();
        let fresh = GraphProvider::new(dir.path(), &graph_config("graph.json"));
        let (cached, source) = fresh.graph_with_source().unwrap();
        assert_eq!(source, GraphSource::Cache);
        assert!(!cached.contains("src/c.ts"));
    }

    #[test]
    fn test_invalidate_cache_forces_rescan() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.ts"), "export {};\n").unwrap();

        let provider = GraphProvider::new(dir.path(), &graph_config("graph.json"));
        provider.graph().unwrap();
        assert!(provider.invalidate_cache().unwrap());
        assert!(!provider.invalidate_cache().unwrap());

        let fresh = GraphProvider::new(dir.path(), &graph_config("graph.json"));
        let (_, source) = fresh.graph_with_source().unwrap();
        assert_eq!(source, GraphSource::Scan);
    }

    #[test]
    fn test_scan_failure_is_surfaced() {
        let dir = tempdir().unwrap();
        let provider = GraphProvider::new(dir.path(), &graph_config("graph.json"));

        let err = provider.graph().unwrap_err();
        assert!(err.to_string().contains("Failed to build module graph"));
        assert!(!dir.path().join("graph.json").exists());
    }
}
