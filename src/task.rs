//! Check descriptors and result types for reporting

use clap::ValueEnum;
use std::fmt;

/// A quality gate that can be requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TaskKind {
    Lint,
    Build,
    Test,
    Component,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Lint,
        TaskKind::Build,
        TaskKind::Test,
        TaskKind::Component,
    ];

    /// Display name used as the output prefix and in summaries
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Lint => "Lint",
            TaskKind::Build => "Build",
            TaskKind::Test => "Test",
            TaskKind::Component => "Component",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            TaskKind::Lint => "blue",
            TaskKind::Build => "green",
            TaskKind::Test => "yellow",
            TaskKind::Component => "cyan",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An external command to execute and how to display it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: String,
    pub command: String,
    pub color: String,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            color: color.into(),
        }
    }

    pub fn for_kind(kind: TaskKind, command: impl Into<String>) -> Self {
        Self::new(kind.label(), command, kind.color())
    }
}

/// Outcome of one check. Exit code zero is the only success signal.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    Task {
        task: TaskDescriptor,
        exit_code: i32,
        duration_secs: Option<f64>,
        message: Option<String>,
    },
    /// A failure of the orchestration itself, not attributable to one check
    Orchestration { exit_code: i32, message: String },
}

impl CheckResult {
    pub fn passed(task: TaskDescriptor) -> Self {
        CheckResult::Task {
            task,
            exit_code: 0,
            duration_secs: None,
            message: None,
        }
    }

    pub fn failed(task: TaskDescriptor, exit_code: i32, message: impl Into<String>) -> Self {
        CheckResult::Task {
            task,
            exit_code,
            duration_secs: None,
            message: Some(message.into()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CheckResult::Task { exit_code, .. } | CheckResult::Orchestration { exit_code, .. } => {
                *exit_code
            }
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }

    pub fn task(&self) -> Option<&TaskDescriptor> {
        match self {
            CheckResult::Task { task, .. } => Some(task),
            CheckResult::Orchestration { .. } => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CheckResult::Task { task, .. } => &task.name,
            CheckResult::Orchestration { .. } => "Orchestration",
        }
    }

    pub fn command(&self) -> &str {
        match self {
            CheckResult::Task { task, .. } => &task.command,
            CheckResult::Orchestration { .. } => "(none)",
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match self {
            CheckResult::Task { duration_secs, .. } => *duration_secs,
            CheckResult::Orchestration { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CheckResult::Task { message, .. } => message.as_deref(),
            CheckResult::Orchestration { message, .. } => Some(message),
        }
    }
}

/// Round a duration in seconds to two decimals
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
