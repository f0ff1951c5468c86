use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::task::{CheckResult, TaskDescriptor};

/// Everything one invocation saw and ran, in order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub changed_files: Vec<String>,
    pub affected_files: Vec<String>,
    pub commands_executed: Vec<TaskDescriptor>,
    pub results: Vec<CheckResult>,
}

impl RunReport {
    pub fn new(changed_files: Vec<String>, affected_files: Vec<String>) -> Self {
        Self {
            changed_files,
            affected_files,
            ..Self::default()
        }
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(CheckResult::success)
    }
}

fn duration_suffix(result: &CheckResult) -> String {
    result
        .duration_secs()
        .map(|secs| format!(" in {:.2}s", secs))
        .unwrap_or_default()
}

/// Print the pass/fail summary for every result
pub fn print_summary(results: &[CheckResult]) {
    println!("\n");
    println!("{}", "--- Summary ---".cyan());

    for result in results {
        let duration = duration_suffix(result);

        if result.success() {
            println!("{}", format!("✔️  {} passed{}", result.label(), duration).green());
        } else {
            println!("{}", format!("❌ {} failed{}", result.label(), duration).red());
            println!("{}", format!("Command: {}", result.command()).red());
            println!("{}", format!("Exit Code: {}", result.exit_code()).red());
            if let Some(message) = result.message() {
                println!("{}", message.dimmed());
            }
        }
    }

    if results.iter().all(CheckResult::success) {
        println!(
            "\n{}",
            "🎉 Congratulations! You have been given the green light 🚦"
                .green()
                .bold()
        );
    }
}

/// Write the Markdown report
pub fn generate_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let markdown = build_markdown(report);
    fs::write(output_path, markdown)
        .with_context(|| format!("Failed to write report: {}", output_path.display()))?;
    Ok(())
}

fn build_markdown(report: &RunReport) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Greenlight Report\n");
    let _ = writeln!(
        md,
        "_Generated {}_\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let _ = writeln!(md, "## Changed Files");
    for file in &report.changed_files {
        let _ = writeln!(md, "- {}", file);
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Affected Files");
    for file in &report.affected_files {
        let _ = writeln!(md, "- {}", file);
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Commands Executed");
    for command in &report.commands_executed {
        let _ = writeln!(md, "- {}: {}", command.name, command.command);
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Results");
    for result in &report.results {
        let duration = duration_suffix(result);
        if result.success() {
            let _ = writeln!(md, "✔️  {} passed{}", result.label(), duration);
        } else {
            let _ = writeln!(md, "❌ {} failed{}", result.label(), duration);
            let _ = writeln!(md, "Command: {}", result.command());
            let _ = writeln!(md, "Exit Code: {}", result.exit_code());
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use tempfile::tempdir;

    fn sample_report() -> RunReport {
        let lint = TaskDescriptor::for_kind(TaskKind::Lint, "npm run lint");
        let build = TaskDescriptor::for_kind(TaskKind::Build, "npm run build");

        let mut report = RunReport::new(
            vec!["src/a.ts".to_string()],
            vec!["src/a.ts".to_string(), "src/b.tsx".to_string()],
        );
        report.commands_executed = vec![lint.clone(), build.clone()];
        report.results = vec![
            CheckResult::Task {
                task: lint,
                exit_code: 0,
                duration_secs: Some(1.5),
                message: None,
            },
            CheckResult::Task {
                task: build,
                exit_code: 2,
                duration_secs: Some(3.0),
                message: None,
            },
        ];
        report
    }

    #[test]
    fn test_markdown_sections() {
        let md = build_markdown(&sample_report());

        assert!(md.starts_with("# Greenlight Report\n"));
        assert!(md.contains("## Changed Files\n- src/a.ts\n"));
        assert!(md.contains("## Affected Files\n- src/a.ts\n- src/b.tsx\n"));
        assert!(md.contains("- Lint: npm run lint\n- Build: npm run build\n"));
        assert!(md.contains("✔️  Lint passed in 1.50s\n"));
        assert!(md.contains("❌ Build failed in 3.00s\nCommand: npm run build\nExit Code: 2\n"));
    }

    #[test]
    fn test_orchestration_failure_in_report() {
        let mut report = RunReport::default();
        report.results.push(CheckResult::Orchestration {
            exit_code: 1,
            message: "join error".to_string(),
        });

        let md = build_markdown(&report);
        assert!(md.contains("❌ Orchestration failed\nCommand: (none)\nExit Code: 1\n"));
        assert!(!report.all_passed());
    }

    #[test]
    fn test_generate_report_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("greenlight_report.md");

        generate_report(&sample_report(), &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Results"));
    }
}
