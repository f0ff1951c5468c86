//! Phased check runner
//!
//! security (optional) -> lint/build -> test/component -> summary and report.
//! Security and lint/build failures stop the pipeline; test/component
//! failures are reported like everything else.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use super::phase::{PhaseExecutor, ProcessGroups};
use super::plan;
use crate::config::Config;
use crate::git;
use crate::report::{self, RunReport};
use crate::security::{ChangedFilesScan, SecurityScan};
use crate::task::{CheckResult, TaskDescriptor, TaskKind};

/// Options for one run of the checks
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Checks to run; lint/build and test/component are grouped into phases
    pub tasks: Vec<TaskKind>,
    /// Append the lint fix arguments
    pub fix: bool,
    pub changed_files: Option<Vec<String>>,
    /// Impacted set; `None` runs unscoped checks
    pub impacted_files: Option<Vec<String>>,
    /// Mark the secondary-tool config assume-unchanged before component runs
    pub ignore_secondary_tool: bool,
    pub check_security: bool,
    pub generate_report: bool,
}

/// The gate that stopped a run early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Security,
    LintBuild,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub halted: Option<Halt>,
}

impl RunOutcome {
    /// True when every executed check exited with code zero
    pub fn passed(&self) -> bool {
        self.report.all_passed()
    }
}

/// Runs the phases for one invocation and owns its results
pub struct Runner<'a> {
    config: &'a Config,
    base_dir: &'a Path,
    security: Box<dyn SecurityScan + Send + Sync + 'a>,
    executor: PhaseExecutor,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config, base_dir: &'a Path) -> Self {
        Self {
            config,
            base_dir,
            security: Box::new(ChangedFilesScan::from_config(config)),
            executor: PhaseExecutor::from_config(base_dir, config),
        }
    }

    pub fn with_security_scan(mut self, scan: Box<dyn SecurityScan + Send + Sync + 'a>) -> Self {
        self.security = scan;
        self
    }

    pub fn with_executor(mut self, executor: PhaseExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Process groups of the checks this runner currently has running
    pub fn process_groups(&self) -> ProcessGroups {
        self.executor.process_groups()
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunOutcome> {
        if options.generate_report && options.impacted_files.is_none() {
            anyhow::bail!("The report can only be generated for impacted-set runs (--smart)");
        }

        let mut report = RunReport::new(
            options.changed_files.clone().unwrap_or_default(),
            options.impacted_files.clone().unwrap_or_default(),
        );

        if options.check_security {
            let findings = self.security.scan(self.base_dir);
            let blocked = findings.iter().any(|r| !r.success());
            report.results.extend(findings);

            if blocked {
                println!(
                    "{}",
                    "Security checks failed. Please fix the issues and try again.".red()
                );
                return self.finish(report, Some(Halt::Security), options);
            }
        }

        if options.tasks.is_empty() {
            anyhow::bail!("No valid tasks specified");
        }

        // Lint and build
        let lint_build = plan::lint_build_phase(self.config, &options.tasks, options.fix);
        if !lint_build.is_empty() {
            let results = self.run_phase(&mut report, lint_build).await;
            if results.iter().any(|r| !r.success()) {
                println!(
                    "{}",
                    "Lint or Build failed. Please fix the issues and try again.".red()
                );
                return self.finish(report, Some(Halt::LintBuild), options);
            }
        }

        // Tests and component specs
        let impacted = options.impacted_files.as_deref();
        let mut test_component = Vec::new();

        if options.tasks.contains(&TaskKind::Test) {
            match plan::test_descriptor(self.config, impacted) {
                Some(task) => test_component.push(task),
                None => println!("{}", "No impacted test files found.".yellow()),
            }
        }

        if options.tasks.contains(&TaskKind::Component) {
            if options.ignore_secondary_tool {
                self.mark_secondary_tool();
            }

            match plan::component_descriptor(self.config, impacted) {
                Some(task) => test_component.push(task),
                None => println!("{}", "No impacted component specs found.".yellow()),
            }
        }

        if !test_component.is_empty() {
            self.run_phase(&mut report, test_component).await;
        }

        self.finish(report, None, options)
    }

    /// Run one phase, recording its descriptors and results in the report
    async fn run_phase(
        &self,
        report: &mut RunReport,
        phase: Vec<TaskDescriptor>,
    ) -> Vec<CheckResult> {
        println!(
            "\n{} Running {}",
            "⚡".yellow(),
            phase
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
                .bold()
        );

        let results = self.executor.run(&phase).await;
        report.commands_executed.extend(phase);
        report.results.extend(results.iter().cloned());
        results
    }

    /// Best effort: a failure is logged and the run continues
    fn mark_secondary_tool(&self) {
        let marker = &self.config.component.marker_file;
        match git::assume_unchanged(self.base_dir, marker) {
            Ok(()) => println!(
                "{} Git assume-unchanged set for {}",
                "✓".green(),
                marker
            ),
            Err(e) => eprintln!(
                "{} Failed to set git assume-unchanged for {}: {:#}",
                "✗".red(),
                marker,
                e
            ),
        }
    }

    fn finish(
        &self,
        report: RunReport,
        halted: Option<Halt>,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        report::print_summary(&report.results);

        if options.generate_report {
            let path = self.base_dir.join(&self.config.report.path);
            report::generate_report(&report, &path)
                .context("Failed to generate the Markdown report")?;
            println!("{} Report written to {}", "✓".green(), path.display());
        }

        Ok(RunOutcome { report, halted })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    struct StubScan(Vec<CheckResult>);

    impl SecurityScan for StubScan {
        fn scan(&self, _base_dir: &Path) -> Vec<CheckResult> {
            self.0.clone()
        }
    }

    fn quiet_scan() -> Box<StubScan> {
        Box::new(StubScan(Vec::new()))
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.commands.lint = "touch lint_ran".to_string();
        config.commands.lint_fix = String::new();
        config.commands.build = "touch build_ran".to_string();
        config.commands.test = "touch test_ran".to_string();
        config.commands.test_scoped = String::new();
        config.commands.component = "touch component_ran; true".to_string();
        config.execution.kill_grace_secs = 1;
        config
    }

    fn impacted(files: &[&str]) -> Option<Vec<String>> {
        Some(files.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_full_run_passes() {
        let dir = tempdir().unwrap();
        let config = config();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        let options = RunOptions {
            tasks: TaskKind::ALL.to_vec(),
            impacted_files: impacted(&["src/Button.test.tsx", "cypress/component/Button.cy.tsx"]),
            ..Default::default()
        };
        let outcome = runner.run(&options).await.unwrap();

        assert!(outcome.passed());
        assert!(outcome.halted.is_none());
        assert_eq!(outcome.report.results.len(), 4);
        assert_eq!(outcome.report.commands_executed.len(), 4);
        assert!(dir.path().join("test_ran").exists());
        assert!(dir.path().join("component_ran").exists());
    }

    #[tokio::test]
    async fn test_lint_failure_kills_build_and_skips_tests() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.commands.lint = "exit 3".to_string();
        config.commands.build = "sleep 5; true".to_string();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        let options = RunOptions {
            tasks: TaskKind::ALL.to_vec(),
            impacted_files: impacted(&["src/Button.test.tsx"]),
            ..Default::default()
        };

        let started = Instant::now();
        let outcome = runner.run(&options).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(outcome.halted, Some(Halt::LintBuild));
        assert!(!outcome.passed());

        let labels: Vec<&str> = outcome.report.results.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["Lint", "Build"]);
        assert_eq!(outcome.report.results[0].exit_code(), 3);
        assert!(!outcome.report.results[1].success());
        assert!(!dir.path().join("test_ran").exists());
    }

    #[tokio::test]
    async fn test_crashed_driver_halts_like_lint_build_failure() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.commands.build = "sleep 5; true".to_string();
        let executor = PhaseExecutor::from_config(dir.path(), &config).with_crashing_driver("Lint");
        let runner = Runner::new(&config, dir.path())
            .with_security_scan(quiet_scan())
            .with_executor(executor);

        let options = RunOptions {
            tasks: TaskKind::ALL.to_vec(),
            impacted_files: impacted(&["src/Button.test.tsx"]),
            ..Default::default()
        };

        let started = Instant::now();
        let outcome = runner.run(&options).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(outcome.halted, Some(Halt::LintBuild));
        assert!(!outcome.passed());

        let labels: Vec<&str> = outcome.report.results.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["Build", "Orchestration"]);
        assert!(!outcome.report.results[0].success());
        assert!(!dir.path().join("lint_ran").exists());
        assert!(!dir.path().join("test_ran").exists());
    }

    #[tokio::test]
    async fn test_report_requires_impacted_set() {
        let dir = tempdir().unwrap();
        let config = config();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        let options = RunOptions {
            tasks: vec![TaskKind::Lint],
            generate_report: true,
            ..Default::default()
        };

        assert!(runner.run(&options).await.is_err());
        assert!(!dir.path().join("lint_ran").exists());
    }

    #[tokio::test]
    async fn test_no_impacted_unit_tests_is_not_a_failure() {
        let dir = tempdir().unwrap();
        let config = config();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        let options = RunOptions {
            tasks: vec![TaskKind::Test],
            impacted_files: impacted(&["src/Button.tsx"]),
            ..Default::default()
        };
        let outcome = runner.run(&options).await.unwrap();

        assert!(outcome.passed());
        assert!(outcome.report.results.is_empty());
        assert!(!dir.path().join("test_ran").exists());
    }

    #[tokio::test]
    async fn test_security_failure_blocks_lint_build() {
        let dir = tempdir().unwrap();
        let config = config();
        let finding = CheckResult::failed(
            TaskDescriptor::new("Secret Check", "secret pattern scan src/a.ts", "magenta"),
            1,
            "possible secret at line(s) 3",
        );
        let runner = Runner::new(&config, dir.path())
            .with_security_scan(Box::new(StubScan(vec![finding])));

        let options = RunOptions {
            tasks: TaskKind::ALL.to_vec(),
            check_security: true,
            ..Default::default()
        };
        let outcome = runner.run(&options).await.unwrap();

        assert_eq!(outcome.halted, Some(Halt::Security));
        assert_eq!(outcome.report.results.len(), 1);
        assert!(!dir.path().join("lint_ran").exists());
        assert!(!dir.path().join("build_ran").exists());
    }

    #[tokio::test]
    async fn test_empty_task_list_is_rejected() {
        let dir = tempdir().unwrap();
        let config = config();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        let err = runner.run(&RunOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("No valid tasks"));
    }

    #[tokio::test]
    async fn test_test_failure_still_reports() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.commands.test = "exit 1".to_string();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        let options = RunOptions {
            tasks: vec![TaskKind::Build, TaskKind::Test],
            changed_files: impacted(&["src/Button.tsx"]),
            impacted_files: impacted(&["src/Button.tsx", "src/Button.test.tsx"]),
            generate_report: true,
            ..Default::default()
        };
        let outcome = runner.run(&options).await.unwrap();

        assert!(outcome.halted.is_none());
        assert!(!outcome.passed());

        let markdown = fs::read_to_string(dir.path().join("greenlight_report.md")).unwrap();
        assert!(markdown.contains("- src/Button.test.tsx"));
        assert!(markdown.contains("❌ Test failed"));
    }

    #[tokio::test]
    async fn test_marker_failure_does_not_abort() {
        let dir = tempdir().unwrap();
        let config = config();
        let runner = Runner::new(&config, dir.path()).with_security_scan(quiet_scan());

        // Not a git repository, so the marker step fails
        let options = RunOptions {
            tasks: vec![TaskKind::Component],
            impacted_files: impacted(&["cypress/component/Button.cy.tsx"]),
            ignore_secondary_tool: true,
            ..Default::default()
        };
        let outcome = runner.run(&options).await.unwrap();

        assert!(outcome.passed());
        assert_eq!(outcome.report.results.len(), 1);
        assert!(dir.path().join("component_ran").exists());
    }
}
