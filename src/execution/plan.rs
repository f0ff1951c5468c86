//! Command construction for each phase

use crate::config::Config;
use crate::task::{TaskDescriptor, TaskKind};

/// Descriptors for the lint/build phase, lint first
pub fn lint_build_phase(config: &Config, tasks: &[TaskKind], fix: bool) -> Vec<TaskDescriptor> {
    let mut phase = Vec::new();

    if tasks.contains(&TaskKind::Lint) {
        let mut command = expand(&config.commands.lint);
        if fix {
            command = join_args(&command, &expand(&config.commands.lint_fix));
        }
        phase.push(TaskDescriptor::for_kind(TaskKind::Lint, command));
    }

    if tasks.contains(&TaskKind::Build) {
        phase.push(TaskDescriptor::for_kind(
            TaskKind::Build,
            expand(&config.commands.build),
        ));
    }

    phase
}

/// Unit test run. `None` means unscoped (every test); an impacted set
/// with no unit test files yields no descriptor.
pub fn test_descriptor(config: &Config, impacted: Option<&[String]>) -> Option<TaskDescriptor> {
    let test = expand(&config.commands.test);

    let Some(impacted) = impacted else {
        return Some(TaskDescriptor::for_kind(TaskKind::Test, test));
    };

    let suffix = &config.suffixes.unit_test;
    let names: Vec<String> = impacted
        .iter()
        .filter(|file| file.ends_with(suffix.as_str()))
        .filter_map(|file| basename(file).strip_suffix(suffix.as_str()))
        .filter(|name| !name.is_empty())
        .map(|name| shell_words::quote(name).into_owned())
        .collect();

    if names.is_empty() {
        return None;
    }

    let scoped = join_args(&test, &expand(&config.commands.test_scoped));
    Some(TaskDescriptor::for_kind(
        TaskKind::Test,
        join_args(&scoped, &names.join(" ")),
    ))
}

/// Component run over the impacted component specs, if any
pub fn component_descriptor(config: &Config, impacted: Option<&[String]>) -> Option<TaskDescriptor> {
    let suffix = &config.suffixes.component_spec;
    let specs: Vec<&str> = impacted
        .unwrap_or_default()
        .iter()
        .filter(|file| file.ends_with(suffix.as_str()))
        .map(String::as_str)
        .collect();

    if specs.is_empty() {
        return None;
    }

    // One shell word, whatever characters the paths contain
    let specs = shell_words::quote(&specs.join(",")).into_owned();
    let command = format!("{} --spec {}", expand(&config.commands.component), specs);
    Some(TaskDescriptor::for_kind(TaskKind::Component, command))
}

fn basename(file: &str) -> &str {
    file.rsplit('/').next().unwrap_or(file)
}

fn join_args(command: &str, args: &str) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args)
    }
}

/// Expand `$VARS` and `~` in a configured command, leaving it as-is on failure
pub fn expand(command: &str) -> String {
    shellexpand::full(command)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| command.to_string())
}
