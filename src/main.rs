use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use greenlight::config::{Config, CONFIG_FILE};
use greenlight::graph::GraphSource;
use greenlight::targets::update_component_targets;
use greenlight::{analyze_impact, GraphProvider, RunOptions, Runner, TaskKind};

#[derive(Parser)]
#[command(name = "greenlight")]
#[command(about = "Run preflight checks only where a change can matter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run lint, build, test and component checks on the impacted files
    #[arg(long)]
    smart: bool,

    /// Checks to run on the impacted files, e.g. lint,build,test,component
    #[arg(long, value_enum, value_delimiter = ',')]
    only: Option<Vec<TaskKind>>,

    /// Auto-fix lint issues; on its own, runs lint over the whole project
    #[arg(long)]
    fix: bool,

    /// Scan changed files for console.log calls and secrets first
    #[arg(long)]
    secure: bool,

    /// Write the Markdown report (only with --smart)
    #[arg(long, requires = "smart")]
    report: bool,

    /// Mark the secondary-tool config assume-unchanged before component runs
    #[arg(long, alias = "ignore-applitools")]
    ignore_secondary_tool: bool,

    /// Delete the dependency graph cache before analysis
    #[arg(long, global = true)]
    rebuild_graph: bool,

    /// Path to config file (default: greenlight.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or load the dependency graph and show its size
    Graph {
        /// Rescan sources even when a cache exists
        #[arg(long)]
        rebuild: bool,
    },

    /// Refresh the component target-spec file from uncommitted changes
    Targets,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool> {
    if std::env::args_os().len() <= 1 {
        print_intro();
        Cli::command().print_help()?;
        println!();
        return Ok(true);
    }

    let cli = Cli::parse();
    let (config, base_dir) = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Graph { rebuild }) => {
            cmd_graph(&config, &base_dir, rebuild || cli.rebuild_graph)?;
            Ok(true)
        }
        Some(Commands::Targets) => {
            cmd_targets(&config, &base_dir, cli.rebuild_graph)?;
            Ok(true)
        }
        None => {
            print_intro();
            cmd_check(&cli, &config, &base_dir)
        }
    }
}

/// Explicit config paths must exist; the default one is optional
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let config_path = std::fs::canonicalize(path)
                .with_context(|| format!("Could not find config file: {}", path.display()))?;
            let config = Config::load(&config_path)
                .with_context(|| format!("Could not load {}", config_path.display()))?;
            let base_dir = config_path
                .parent()
                .map(Path::to_path_buf)
                .context("Config file has no parent directory")?;
            Ok((config, base_dir))
        }
        None => {
            let base_dir = std::env::current_dir()
                .and_then(std::fs::canonicalize)
                .context("Could not resolve the current directory")?;
            let config = Config::load_or_default(&base_dir.join(CONFIG_FILE))?;
            Ok((config, base_dir))
        }
    }
}

fn print_intro() {
    println!("{}", "GreenLight".green().bold());
    println!("{}", "A CLI tool for running preflight checks efficiently.".green());
    println!();
}

fn graph_provider(config: &Config, base_dir: &Path, rebuild: bool) -> Result<GraphProvider> {
    let provider = GraphProvider::new(base_dir, &config.graph);
    if rebuild && provider.invalidate_cache()? {
        println!(
            "{} Removed graph cache {}",
            "→".blue(),
            provider.cache_path().display()
        );
    }
    Ok(provider)
}

fn cmd_check(cli: &Cli, config: &Config, base_dir: &Path) -> Result<bool> {
    // --only wins over --smart, --fix alone lints everything
    let (tasks, smart) = if let Some(only) = &cli.only {
        (only.clone(), true)
    } else if cli.smart {
        (TaskKind::ALL.to_vec(), true)
    } else if cli.fix {
        (vec![TaskKind::Lint], false)
    } else {
        anyhow::bail!("Nothing to run: pass --smart, --only <TASKS> or --fix (see --help)");
    };

    let mut options = RunOptions {
        tasks,
        fix: cli.fix,
        ignore_secondary_tool: cli.ignore_secondary_tool,
        check_security: cli.secure,
        generate_report: cli.report,
        ..Default::default()
    };

    if smart {
        let provider = graph_provider(config, base_dir, cli.rebuild_graph)?;
        let analysis = analyze_impact(config, base_dir, &provider)?;
        options.changed_files = Some(analysis.changed_files);
        options.impacted_files = Some(analysis.impacted_files);
    }

    let runner = Runner::new(config, base_dir);
    let groups = runner.process_groups();

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        tokio::spawn(async move {
            let (message, code) = match shutdown_signal().await {
                Shutdown::Interrupt => ("Process interrupted by user. Bye!", 130),
                Shutdown::Terminate => ("Process terminated by user. Bye!", 143),
            };
            groups.terminate_all();
            eprintln!("\n{}", message.red());
            std::process::exit(code);
        });

        runner.run(&options).await
    })?;

    Ok(outcome.passed())
}

enum Shutdown {
    Interrupt,
    Terminate,
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() -> Shutdown {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Shutdown::Interrupt,
            Err(e) => {
                eprintln!("{} Failed to listen for Ctrl-C: {}", "⚠".yellow(), e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                Shutdown::Terminate
            }
            Err(e) => {
                eprintln!("{} Failed to listen for SIGTERM: {}", "⚠".yellow(), e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Shutdown>();

    tokio::select! {
        shutdown = ctrl_c => shutdown,
        shutdown = terminate => shutdown,
    }
}

fn cmd_graph(config: &Config, base_dir: &Path, rebuild: bool) -> Result<()> {
    let provider = graph_provider(config, base_dir, rebuild)?;
    let (graph, source) = provider.graph_with_source()?;

    let source = match source {
        GraphSource::Memory => "memory",
        GraphSource::Cache => "cache",
        GraphSource::Scan => "fresh scan",
    };

    println!("\n{}", "Dependency graph".bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("  {:<10} {}", "Files:".cyan(), graph.len());
    println!("  {:<10} {}", "Imports:".cyan(), graph.edge_count());
    println!("  {:<10} {}", "Source:".cyan(), source);
    println!(
        "  {:<10} {}",
        "Cache:".cyan(),
        provider.cache_path().display().to_string().dimmed()
    );

    Ok(())
}

fn cmd_targets(config: &Config, base_dir: &Path, rebuild: bool) -> Result<()> {
    let provider = graph_provider(config, base_dir, rebuild)?;
    update_component_targets(config, base_dir, &provider)?;
    Ok(())
}
