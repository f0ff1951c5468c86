//! Static import scan over the project's source roots
//!
//! Imports are found with a lightweight pattern scan (no full parse) and
//! resolved to files the way a bundler would: relative paths first, then
//! tsconfig `paths` aliases, trying each known extension and `index` files.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{normalize_path, ModuleGraph};
use crate::config::GraphConfig;

const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git"];

/// Scan every configured root and build the graph
pub fn scan_project(base_dir: &Path, config: &GraphConfig) -> Result<ModuleGraph> {
    let tsconfig_path = Path::new(&config.tsconfig);
    let aliases = PathAliases::load(base_dir, tsconfig_path)?;
    let resolver = Resolver {
        base_dir,
        extensions: &config.extensions,
        aliases,
    };
    let extractor = ImportExtractor::new()?;

    let files = collect_source_files(base_dir, config)?;
    let mut edges = Vec::with_capacity(files.len());

    for file in files {
        let bytes = fs::read(base_dir.join(&file))
            .with_context(|| format!("Failed to read source file: {}", file))?;
        let source = String::from_utf8_lossy(&bytes);

        let deps: Vec<String> = extractor
            .specifiers(&source)
            .filter_map(|specifier| resolver.resolve(&file, specifier))
            .filter(|dep| *dep != file)
            .collect();

        edges.push((file, deps));
    }

    Ok(ModuleGraph::from_edges(edges))
}

/// Find source files under the configured roots, as project-relative keys
pub fn collect_source_files(base_dir: &Path, config: &GraphConfig) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    let mut scanned_roots = 0;

    for root in &config.roots {
        let root_dir = base_dir.join(root);
        if !root_dir.is_dir() {
            println!(
                "{} Source root {} not found, skipping",
                "⚠".yellow(),
                root.cyan()
            );
            continue;
        }
        scanned_roots += 1;

        let escaped_root = glob::Pattern::escape(&root_dir.to_string_lossy());
        for ext in &config.extensions {
            let pattern = format!("{}/**/*.{}", escaped_root, ext);
            let paths = glob::glob(&pattern)
                .with_context(|| format!("Invalid source pattern: {}", pattern))?;

            for entry in paths {
                let path = entry.context("Failed to read source directory")?;
                if !path.is_file() || is_excluded(&path) {
                    continue;
                }
                if let Some(key) = project_key(base_dir, &path) {
                    files.insert(key);
                }
            }
        }
    }

    if scanned_roots == 0 {
        bail!(
            "None of the source roots exist under {}: {}",
            base_dir.display(),
            config.roots.join(", ")
        );
    }

    Ok(files)
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => EXCLUDED_DIRS.iter().any(|exc| name == *exc),
        _ => false,
    })
}

fn project_key(base_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base_dir).ok()?;
    Some(path_key(relative))
}

fn path_key(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

/// Pulls module specifiers out of JS/TS source text
pub struct ImportExtractor {
    static_imports: Regex,
    call_imports: Regex,
}

impl ImportExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            static_imports: Regex::new(
                r#"\b(?:import|export)\s+(?:type\s+)?(?:[\w$*{}\s,]+?\s+from\s+)?["']([^"'\n]+)["']"#,
            )?,
            call_imports: Regex::new(r#"\b(?:require|import)\s*\(\s*["']([^"'\n]+)["']\s*\)"#)?,
        })
    }

    pub fn specifiers<'s>(&'s self, source: &'s str) -> impl Iterator<Item = &'s str> + 's {
        self.static_imports
            .captures_iter(source)
            .chain(self.call_imports.captures_iter(source))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
    }
}

struct Resolver<'a> {
    base_dir: &'a Path,
    extensions: &'a [String],
    aliases: Option<PathAliases>,
}

impl Resolver<'_> {
    fn resolve(&self, importer: &str, specifier: &str) -> Option<String> {
        if is_relative(specifier) {
            let dir = Path::new(importer).parent().unwrap_or_else(|| Path::new(""));
            return self.resolve_candidate(&dir.join(specifier));
        }

        let aliases = self.aliases.as_ref()?;
        aliases
            .candidates(specifier)
            .iter()
            .find_map(|candidate| self.resolve_candidate(candidate))
    }

    fn resolve_candidate(&self, candidate: &Path) -> Option<String> {
        let candidate = lexical_normalize(candidate)?;

        let has_known_ext = candidate
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known == e))
            .unwrap_or(false);

        if has_known_ext && self.is_file(&candidate) {
            return Some(path_key(&candidate));
        }

        let display = candidate.to_string_lossy();
        for ext in self.extensions {
            let with_ext = PathBuf::from(format!("{}.{}", display, ext));
            if self.is_file(&with_ext) {
                return Some(path_key(&with_ext));
            }
        }

        for ext in self.extensions {
            let index = candidate.join(format!("index.{}", ext));
            if self.is_file(&index) {
                return Some(path_key(&index));
            }
        }

        None
    }

    fn is_file(&self, relative: &Path) -> bool {
        self.base_dir.join(relative).is_file()
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Resolve `.` and `..` without touching the filesystem. Paths that are
/// absolute or climb above the project root have no key.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsConfig {
    #[serde(default)]
    compiler_options: CompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompilerOptions {
    base_url: Option<String>,
    #[serde(default)]
    paths: BTreeMap<String, Vec<String>>,
}

/// tsconfig `baseUrl` and `paths`, with targets relative to the project root
#[derive(Debug)]
pub struct PathAliases {
    base: PathBuf,
    has_base_url: bool,
    /// (prefix, suffix or None for exact patterns, targets), longest prefix first
    patterns: Vec<(String, Option<String>, Vec<String>)>,
}

impl PathAliases {
    /// Read the tsconfig. A missing file means no aliases; an unparsable one
    /// is an error so the scan never silently loses alias edges.
    pub fn load(base_dir: &Path, tsconfig: &Path) -> Result<Option<Self>> {
        let path = base_dir.join(tsconfig);
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: TsConfig = serde_json::from_str(&strip_jsonc(&content))
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let config_dir = tsconfig.parent().unwrap_or_else(|| Path::new(""));
        Ok(Some(Self::from_options(config_dir, config.compiler_options)))
    }

    fn from_options(config_dir: &Path, options: CompilerOptions) -> Self {
        let has_base_url = options.base_url.is_some();
        let base = config_dir.join(options.base_url.as_deref().unwrap_or("."));

        let mut patterns: Vec<(String, Option<String>, Vec<String>)> = options
            .paths
            .into_iter()
            .map(|(pattern, targets)| match pattern.split_once('*') {
                Some((prefix, suffix)) => (prefix.to_string(), Some(suffix.to_string()), targets),
                None => (pattern, None, targets),
            })
            .collect();
        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            base,
            has_base_url,
            patterns,
        }
    }

    /// Candidate paths for a bare specifier, in resolution order
    pub fn candidates(&self, specifier: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        for (prefix, suffix, targets) in &self.patterns {
            let captured = match suffix {
                Some(suffix) => {
                    if specifier.len() < prefix.len() + suffix.len()
                        || !specifier.starts_with(prefix.as_str())
                        || !specifier.ends_with(suffix.as_str())
                    {
                        continue;
                    }
                    &specifier[prefix.len()..specifier.len() - suffix.len()]
                }
                None => {
                    if specifier != prefix {
                        continue;
                    }
                    ""
                }
            };

            for target in targets {
                candidates.push(self.base.join(target.replacen('*', captured, 1)));
            }
        }

        if self.has_base_url {
            candidates.push(self.base.join(specifier));
        }

        candidates
    }
}

/// Remove `//` and `/* */` comments and trailing commas from JSONC text
pub fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    remove_trailing_commas(&out)
}

fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}
