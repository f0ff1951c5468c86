//! On-disk cache of the module graph
//!
//! The cache is a JSON object mapping each file to the files it imports.
//! It is trusted as-is when present; delete it to force a rescan.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::ModuleGraph;

/// Load a cached graph, or `None` when no cache file exists
pub fn load(path: &Path) -> Result<Option<ModuleGraph>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph cache: {}", path.display()))?;

    let edges: BTreeMap<String, Vec<String>> = serde_json::from_str(&content).with_context(|| {
        format!(
            "Graph cache {} is not valid JSON; delete it to rebuild",
            path.display()
        )
    })?;

    Ok(Some(ModuleGraph::from_edges(edges)))
}

/// Write the graph as pretty-printed JSON
pub fn save(path: &Path, graph: &ModuleGraph) -> Result<()> {
    let json = serde_json::to_string_pretty(graph.edges())?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write graph cache: {}", path.display()))?;
    Ok(())
}
