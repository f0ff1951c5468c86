//! Greenlight - preflight checks for front-end repositories
//!
//! A library for running quality gates only where a change can matter:
//! - Module dependency graph built from static imports, cached on disk
//! - Change-impact analysis over reverse dependencies
//! - Phased, concurrent lint/build and test/component runs with kill-on-failure
//! - Security scan of changed files (console.log and secrets)
//! - Console summary and Markdown report

pub mod config;
pub mod execution;
pub mod git;
pub mod graph;
pub mod report;
pub mod security;
pub mod targets;
pub mod task;

pub use config::Config;
pub use execution::{Halt, RunOptions, RunOutcome, Runner};
pub use graph::{analyze_impact, impacted_files, GraphProvider, ImpactAnalysis, ModuleGraph};
pub use report::RunReport;
pub use security::{ChangedFilesScan, SecurityScan};
pub use task::{CheckResult, TaskDescriptor, TaskKind};
