//! Security scan of changed files
//!
//! Flags leftover `console.log` calls and obvious hard-coded secrets in the
//! files that differ from HEAD.

use anyhow::Result;
use colored::Colorize;
use regex::Regex;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::git::GitDiff;
use crate::graph::normalize_path;
use crate::task::{CheckResult, TaskDescriptor};

const CONSOLE_LOG_CHECK: &str = "Console Log Check";
const SECRET_CHECK: &str = "Secret Check";
const SECURITY_CHECK: &str = "Security Check";

/// Produces security findings as check results. An empty list, or a list
/// where every exit code is zero, means nothing was found.
pub trait SecurityScan {
    fn scan(&self, base_dir: &Path) -> Vec<CheckResult>;
}

/// Scans the files changed against HEAD
pub struct ChangedFilesScan {
    excluded: Vec<String>,
}

impl ChangedFilesScan {
    pub fn new(excluded: Vec<String>) -> Self {
        Self { excluded }
    }

    /// Configured exclusions plus the generated Markdown report
    pub fn from_config(config: &Config) -> Self {
        let mut excluded = config.security.excluded.clone();
        excluded.push(normalize_path(&config.report.path));
        Self::new(excluded)
    }
}

impl SecurityScan for ChangedFilesScan {
    fn scan(&self, base_dir: &Path) -> Vec<CheckResult> {
        println!("{} Running security checks...", "→".blue());

        let changed = match GitDiff::new(base_dir).and_then(|diff| diff.changed_against_head()) {
            Ok(files) => files,
            Err(e) => {
                eprintln!("{} Error during security checks: {:#}", "✗".red(), e);
                return vec![CheckResult::failed(
                    TaskDescriptor::new(SECURITY_CHECK, "git diff --name-only HEAD", "red"),
                    1,
                    format!("{:#}", e),
                )];
            }
        };

        if changed.is_empty() {
            println!("{} No changed files to check", "✓".green());
            return Vec::new();
        }

        let files: Vec<String> = changed
            .into_iter()
            .filter(|file| {
                let excluded = self.excluded.iter().any(|exc| exc == file);
                if excluded {
                    println!("{} Skipping excluded file: {}", "⚠".yellow(), file);
                }
                !excluded
            })
            .collect();

        match scan_files(base_dir, &files) {
            Ok(results) => results,
            Err(e) => vec![CheckResult::failed(
                TaskDescriptor::new(SECURITY_CHECK, SECURITY_CHECK, "red"),
                1,
                format!("{:#}", e),
            )],
        }
    }
}

struct Patterns {
    secrets: Vec<Regex>,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            secrets: vec![
                Regex::new(r"\bAKIA[0-9A-Z]{16}\b")?,
                Regex::new(r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----")?,
                Regex::new(
                    r#"(?i)\b(?:api[_-]?key|secret|password|passwd|token)\b["']?\s*[:=]\s*["'][^"'\s]{8,}["']"#,
                )?,
            ],
        })
    }

    fn is_secret(&self, line: &str) -> bool {
        self.secrets.iter().any(|re| re.is_match(line))
    }
}

/// Scan the given project-relative files for console.log calls and secrets
pub fn scan_files(base_dir: &Path, files: &[String]) -> Result<Vec<CheckResult>> {
    let patterns = Patterns::new()?;
    let mut results = Vec::new();
    let mut console_logs_found = false;
    let mut secrets_found = false;

    for file in files {
        let path = base_dir.join(file);
        if !path.is_file() {
            println!("{} File not found: {}", "⚠".yellow(), file);
            continue;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("{} Error checking file {}: {}", "✗".red(), file, e);
                results.push(CheckResult::failed(
                    console_log_task(Some(file)),
                    2,
                    e.to_string(),
                ));
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes);

        let mut console_logs = Vec::new();
        let mut secrets = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.contains("console.log") {
                console_logs.push(format!("{}:{}", number + 1, line.trim()));
            }
            if patterns.is_secret(line) {
                // Only the line number: the match itself is the secret
                secrets.push(format!("{}", number + 1));
            }
        }

        if !console_logs.is_empty() {
            let message = console_logs.join("\n");
            println!("{} console.log found in {}:\n{}", "✗".red(), file, message);
            console_logs_found = true;
            results.push(CheckResult::failed(console_log_task(Some(file)), 1, message));
        }

        if !secrets.is_empty() {
            println!(
                "{} Possible secret in {} at line(s) {}",
                "✗".red(),
                file,
                secrets.join(", ")
            );
            secrets_found = true;
            results.push(CheckResult::failed(
                secret_task(Some(file)),
                1,
                format!("possible secret at line(s) {}", secrets.join(", ")),
            ));
        }
    }

    if !console_logs_found {
        println!("{} No console.log statements found in changed files", "✓".green());
        results.push(CheckResult::passed(console_log_task(None)));
    }

    if !secrets_found {
        println!("{} No secrets found in changed files", "✓".green());
        results.push(CheckResult::passed(secret_task(None)));
    }

    Ok(results)
}

fn console_log_task(file: Option<&str>) -> TaskDescriptor {
    let command = match file {
        Some(file) => format!("grep -n console.log {}", file),
        None => "grep -n console.log".to_string(),
    };
    TaskDescriptor::new(CONSOLE_LOG_CHECK, command, "magenta")
}

fn secret_task(file: Option<&str>) -> TaskDescriptor {
    let command = match file {
        Some(file) => format!("secret pattern scan {}", file),
        None => "secret pattern scan".to_string(),
    };
    TaskDescriptor::new(SECRET_CHECK, command, "magenta")
}
