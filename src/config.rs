use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "greenlight.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub commands: Commands,
    #[serde(default)]
    pub suffixes: Suffixes,
    #[serde(default)]
    pub component: ComponentConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Where the module graph is scanned from and cached to
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_cache")]
    pub cache: String,
    #[serde(default = "default_tsconfig")]
    pub tsconfig: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    /// Reference the working branch is diffed against (merge base)
    #[serde(default = "default_upstream")]
    pub upstream: String,
    #[serde(default = "default_changed_extensions")]
    pub changed_extensions: Vec<String>,
}

/// External commands for each check. Values may reference `$VARS`.
#[derive(Debug, Clone, Deserialize)]
pub struct Commands {
    #[serde(default = "default_lint")]
    pub lint: String,
    /// Appended to `lint` when auto-fix is requested
    #[serde(default = "default_lint_fix")]
    pub lint_fix: String,
    #[serde(default = "default_build")]
    pub build: String,
    #[serde(default = "default_test")]
    pub test: String,
    /// Inserted between `test` and the target names in scoped runs
    #[serde(default = "default_test_scoped")]
    pub test_scoped: String,
    #[serde(default = "default_component")]
    pub component: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Suffixes {
    #[serde(default = "default_unit_test_suffix")]
    pub unit_test: String,
    #[serde(default = "default_component_spec_suffix")]
    pub component_spec: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    /// Secondary-tool config marked assume-unchanged on request
    #[serde(default = "default_marker_file")]
    pub marker_file: String,
    #[serde(default = "default_target_spec")]
    pub target_spec: String,
    #[serde(default = "default_spec_dir")]
    pub spec_dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Files never scanned (the Markdown report is always excluded)
    #[serde(default)]
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Budget for a whole phase; unset means checks may run forever
    #[serde(default)]
    pub phase_timeout_secs: Option<u64>,
    /// How long a terminated check gets before it is killed outright
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,
}

fn default_roots() -> Vec<String> {
    vec!["src".to_string(), "cypress/component".to_string()]
}

fn default_extensions() -> Vec<String> {
    ["ts", "tsx", "js", "jsx"].iter().map(|s| s.to_string()).collect()
}

fn default_cache() -> String {
    "dependencyGraphCache.json".to_string()
}

fn default_tsconfig() -> String {
    "tsconfig.json".to_string()
}

fn default_upstream() -> String {
    "origin/master".to_string()
}

fn default_changed_extensions() -> Vec<String> {
    vec!["ts".to_string(), "tsx".to_string()]
}

fn default_lint() -> String {
    "npm run lint".to_string()
}

fn default_lint_fix() -> String {
    "-- --fix".to_string()
}

fn default_build() -> String {
    "npm run build".to_string()
}

fn default_test() -> String {
    "npm run test".to_string()
}

fn default_test_scoped() -> String {
    "-- --no-coverage".to_string()
}

fn default_component() -> String {
    "cypress run CYPRESS_coverage=true --component --headless --reporter spec --env grepUntagged=true"
        .to_string()
}

fn default_unit_test_suffix() -> String {
    ".test.tsx".to_string()
}

fn default_component_spec_suffix() -> String {
    ".cy.tsx".to_string()
}

fn default_marker_file() -> String {
    "applitools.config.js".to_string()
}

fn default_target_spec() -> String {
    "cypress-target-spec.json".to_string()
}

fn default_spec_dir() -> String {
    "cypress/component".to_string()
}

fn default_report_path() -> String {
    "greenlight_report.md".to_string()
}

fn default_kill_grace() -> u64 {
    5
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extensions: default_extensions(),
            cache: default_cache(),
            tsconfig: default_tsconfig(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            upstream: default_upstream(),
            changed_extensions: default_changed_extensions(),
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            lint: default_lint(),
            lint_fix: default_lint_fix(),
            build: default_build(),
            test: default_test(),
            test_scoped: default_test_scoped(),
            component: default_component(),
        }
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self {
            unit_test: default_unit_test_suffix(),
            component_spec: default_component_spec_suffix(),
        }
    }
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            marker_file: default_marker_file(),
            target_spec: default_target_spec(),
            spec_dir: default_spec_dir(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: None,
            kill_grace_secs: default_kill_grace(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the config if the file exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.graph.roots.is_empty() {
            anyhow::bail!("[graph] roots must name at least one source directory");
        }

        if self.graph.extensions.is_empty() {
            anyhow::bail!("[graph] extensions must name at least one file extension");
        }

        if self.execution.phase_timeout_secs == Some(0) {
            anyhow::bail!("[execution] phase_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.execution.phase_timeout_secs.map(Duration::from_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.execution.kill_grace_secs)
    }
}
