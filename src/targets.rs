//! Component target-spec refresh
//!
//! The target-spec file maps each component spec to whether it should run.
//! Refreshing it sets exactly the specs of components impacted by the
//! uncommitted changes to `true`.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::git::GitDiff;
use crate::graph::affected::filter_by_extension;
use crate::graph::{impacted_files, normalize_path, GraphProvider};

const SOURCE_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "jsx"];

/// Rewrite the target-spec file from the files changed against HEAD.
///
/// Returns the number of impacted specs, or `None` when nothing changed
/// and the file was left alone.
pub fn update_component_targets(
    config: &Config,
    base_dir: &Path,
    provider: &GraphProvider,
) -> Result<Option<usize>> {
    let path = base_dir.join(&config.component.target_spec);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read target spec: {}", path.display()))?;
    let targets: Map<String, Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse target spec: {}", path.display()))?;

    let changed = GitDiff::new(base_dir)?.changed_against_head()?;
    let changed = filter_by_extension(&changed, &config.git.changed_extensions);
    if changed.is_empty() {
        println!("{} No changed files, component targets left as they are", "✓".green());
        return Ok(None);
    }

    let graph = provider.graph()?;
    let impacted = impacted_files(&graph, &changed, base_dir);
    let specs = impacted_specs(config, base_dir, &impacted);

    let updated = refresh_targets(&targets, &specs, base_dir);
    let json = serde_json::to_string_pretty(&updated)?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write target spec: {}", path.display()))?;

    println!(
        "{} Component targets updated: {} impacted spec(s)",
        "✓".green(),
        specs.len()
    );

    Ok(Some(specs.len()))
}

/// Existing component specs named after impacted files
fn impacted_specs(config: &Config, base_dir: &Path, impacted: &[String]) -> BTreeSet<String> {
    let spec_dir = normalize_path(&config.component.spec_dir);
    let spec_dir = spec_dir.trim_end_matches('/');

    impacted
        .iter()
        .map(|file| {
            let name = file.rsplit('/').next().unwrap_or(file);
            let stem = match name.rsplit_once('.') {
                Some((stem, ext)) if SOURCE_EXTENSIONS.contains(&ext) => stem,
                _ => name,
            };
            format!("{}/{}{}", spec_dir, stem, config.suffixes.component_spec)
        })
        .filter(|spec| base_dir.join(spec).is_file())
        .collect()
}

/// Same keys as before, `true` exactly for the impacted specs
fn refresh_targets(
    targets: &Map<String, Value>,
    specs: &BTreeSet<String>,
    base_dir: &Path,
) -> Map<String, Value> {
    targets
        .keys()
        .map(|key| {
            let normalized = normalize_path(key);
            let relative = Path::new(&normalized)
                .strip_prefix(base_dir)
                .map(|p| normalize_path(&p.to_string_lossy()))
                .unwrap_or(normalized);
            (key.clone(), Value::Bool(specs.contains(&relative)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::diff::test_support::commit_all;
    use git2::Repository;
    use tempfile::tempdir;

    fn write(base: &Path, file: &str, content: &str) {
        let path = base.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn specs(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_impacted_specs_must_exist() {
        let dir = tempdir().unwrap();
        write(dir.path(), "cypress/component/Button.cy.tsx", "");

        let impacted = vec![
            "src/Button.tsx".to_string(),
            "src/Input.tsx".to_string(),
        ];
        let found = impacted_specs(&Config::default(), dir.path(), &impacted);
        assert_eq!(found, specs(&["cypress/component/Button.cy.tsx"]));
    }

    #[test]
    fn test_refresh_keeps_keys() {
        let targets: Map<String, Value> = serde_json::from_str(
            r#"{ "./cypress/component/Button.cy.tsx": false, "cypress/component/Input.cy.tsx": true }"#,
        )
        .unwrap();

        let updated = refresh_targets(
            &targets,
            &specs(&["cypress/component/Button.cy.tsx"]),
            Path::new("/project"),
        );

        assert_eq!(updated.len(), 2);
        assert_eq!(updated["./cypress/component/Button.cy.tsx"], Value::Bool(true));
        assert_eq!(updated["cypress/component/Input.cy.tsx"], Value::Bool(false));
    }

    #[test]
    fn test_refresh_keeps_key_order() {
        let targets: Map<String, Value> = serde_json::from_str(
            r#"{ "cypress/component/Zoom.cy.tsx": true, "cypress/component/Avatar.cy.tsx": true, "cypress/component/Menu.cy.tsx": false }"#,
        )
        .unwrap();

        let updated = refresh_targets(
            &targets,
            &specs(&["cypress/component/Menu.cy.tsx"]),
            Path::new("/project"),
        );

        let keys: Vec<&str> = updated.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "cypress/component/Zoom.cy.tsx",
                "cypress/component/Avatar.cy.tsx",
                "cypress/component/Menu.cy.tsx",
            ]
        );

        let json = serde_json::to_string_pretty(&updated).unwrap();
        let zoom = json.find("Zoom.cy.tsx").unwrap();
        let avatar = json.find("Avatar.cy.tsx").unwrap();
        assert!(zoom < avatar);
    }

    #[test]
    fn test_update_from_working_tree_changes() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        write(dir.path(), "src/Button.tsx", "export const Button = 1;\n");
        write(dir.path(), "src/Input.tsx", "export const Input = 1;\n");
        write(
            dir.path(),
            "cypress/component/Button.cy.tsx",
            "import { Button } from '../../src/Button';\n",
        );
        write(
            dir.path(),
            "cypress/component/Input.cy.tsx",
            "import { Input } from '../../src/Input';\n",
        );
        write(
            dir.path(),
            "cypress-target-spec.json",
            r#"{ "cypress/component/Button.cy.tsx": false, "cypress/component/Input.cy.tsx": true }"#,
        );
        commit_all(&repo, "initial");

        write(dir.path(), "src/Button.tsx", "export const Button = 2;\n");

        let config = Config::default();
        let provider = GraphProvider::new(dir.path(), &config.graph);
        let count = update_component_targets(&config, dir.path(), &provider).unwrap();
        assert_eq!(count, Some(1));

        let content = fs::read_to_string(dir.path().join("cypress-target-spec.json")).unwrap();
        let updated: Map<String, Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(updated["cypress/component/Button.cy.tsx"], Value::Bool(true));
        assert_eq!(updated["cypress/component/Input.cy.tsx"], Value::Bool(false));
    }

    #[test]
    fn test_no_changes_leaves_file() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let original = r#"{ "cypress/component/Button.cy.tsx": true }"#;
        write(dir.path(), "src/Button.tsx", "export const Button = 1;\n");
        write(dir.path(), "cypress-target-spec.json", original);
        commit_all(&repo, "initial");

        let config = Config::default();
        let provider = GraphProvider::new(dir.path(), &config.graph);
        assert_eq!(
            update_component_targets(&config, dir.path(), &provider).unwrap(),
            None
        );

        let content = fs::read_to_string(dir.path().join("cypress-target-spec.json")).unwrap();
        assert_eq!(content, original);
    }
}
