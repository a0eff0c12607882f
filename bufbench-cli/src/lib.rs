#![warn(missing_docs)]
//! BufBench CLI Library
//!
//! This module provides the command-line driver for the buffer comparison
//! suite: regex task filtering, bufbench.toml discovery with CLI overrides,
//! sequential task execution with a progress bar, and the final score table.

mod config;
mod executor;

pub use config::*;
pub use executor::{TaskOutcome, compute_summaries, execute_tasks, format_table};

use bufbench_core::{CancelToken, TaskConfig, TaskDef, builtin_tasks};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;
use std::time::Instant;

/// BufBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "bufbench")]
#[command(author, version, about = "BufBench - buffer read latency comparison")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Optional subcommand (List, Run); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run arguments when no subcommand is given
    #[command(flatten)]
    pub args: RunArgs,
}

/// Arguments for running tasks, accepted both bare and under `run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Filter tasks by regex pattern
    #[arg(default_value = ".*")]
    pub filter: String,

    /// Warmup invocations per worker
    #[arg(long)]
    pub warmup: Option<u32>,

    /// Measured invocations per worker per fork
    #[arg(long)]
    pub measure: Option<u32>,

    /// Independent replicates per task, each with fresh state
    #[arg(long)]
    pub forks: Option<u32>,

    /// Concurrent worker threads per fork
    #[arg(long, short = 't')]
    pub threads: Option<u32>,

    /// Reads per timed invocation
    #[arg(long)]
    pub batch: Option<u64>,

    /// Directory for memory-mapped backing files
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Confidence level for the error margin (0.0 to 1.0, exclusive)
    #[arg(long, allow_negative_numbers = true)]
    pub confidence: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered tasks
    List {
        /// Filter tasks by regex pattern
        #[arg(default_value = ".*")]
        filter: String,
    },
    /// Run tasks (default)
    Run(RunArgs),
}

/// Run the BufBench CLI with arguments from the environment.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the BufBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let args = match cli.command {
        Some(Commands::List { filter }) => {
            init_logging(false);
            return list_tasks(&filter);
        }
        Some(Commands::Run(args)) => args,
        None => cli.args,
    };

    init_logging(args.verbose);

    // Discover bufbench.toml configuration (CLI flags override)
    let config = BufbenchConfig::discover().unwrap_or_default();
    run_tasks(&args, &config)
}

fn init_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_directives(verbose))
        .init();
}

/// Env-filter directives covering every crate in the workspace. The core
/// crate emits the teardown-failure warning, so filtering its target out
/// would silence it.
fn log_directives(verbose: bool) -> &'static str {
    if verbose {
        "bufbench=debug,bufbench_core=debug,bufbench_stats=debug,bufbench_cli=debug"
    } else {
        "bufbench=info,bufbench_core=info,bufbench_stats=info,bufbench_cli=info"
    }
}

/// Tasks whose id matches the filter, sorted by id for deterministic order.
fn filter_tasks(pattern: &str) -> anyhow::Result<Vec<TaskDef>> {
    let re = Regex::new(pattern)
        .map_err(|e| anyhow::anyhow!("invalid filter pattern '{}': {}", pattern, e))?;
    let mut tasks: Vec<TaskDef> = builtin_tasks()
        .into_iter()
        .filter(|t| re.is_match(t.id))
        .collect();
    tasks.sort_by_key(|t| t.id);
    Ok(tasks)
}

fn list_tasks(pattern: &str) -> anyhow::Result<()> {
    let tasks = filter_tasks(pattern)?;
    println!("BufBench Plan:");
    for task in &tasks {
        println!(
            "├── {} ({}, {:?} backing, {:?} scope)",
            task.id, task.name, task.backing, task.scope
        );
    }
    println!("{} tasks found.", tasks.len());
    Ok(())
}

/// Build a scheduler config by layering: bufbench.toml defaults, then CLI
/// overrides.
fn build_task_config(args: &RunArgs, config: &BufbenchConfig) -> anyhow::Result<TaskConfig> {
    let runner = &config.runner;
    let temp_dir = args
        .temp_dir
        .clone()
        .or_else(|| runner.temp_dir.as_ref().map(PathBuf::from));
    let task_config = TaskConfig::builder()
        .warmup_iters(args.warmup.unwrap_or(runner.warmup_iters))
        .measure_iters(args.measure.unwrap_or(runner.measure_iters))
        .forks(args.forks.unwrap_or(runner.forks))
        .workers(args.threads.unwrap_or(runner.workers))
        .batch(args.batch.unwrap_or(runner.batch))
        .temp_dir(temp_dir)
        .build()?;
    Ok(task_config)
}

/// Confidence level with the same layering, rejected before any task runs.
fn resolve_confidence(args: &RunArgs, config: &BufbenchConfig) -> anyhow::Result<f64> {
    let level = args.confidence.unwrap_or(config.runner.confidence_level);
    if level <= 0.0 || level >= 1.0 {
        anyhow::bail!(
            "confidence level must be between 0 and 1 (exclusive), got {}",
            level
        );
    }
    Ok(level)
}

fn run_tasks(args: &RunArgs, config: &BufbenchConfig) -> anyhow::Result<()> {
    let tasks = filter_tasks(&args.filter)?;
    if tasks.is_empty() {
        println!("No tasks match '{}'.", args.filter);
        return Ok(());
    }

    let task_config = build_task_config(args, config)?;
    let confidence_level = resolve_confidence(args, config)?;

    println!(
        "Running {} tasks: {} fork(s), {} worker(s), {} warmup + {} measured iterations...\n",
        tasks.len(),
        task_config.forks,
        task_config.workers,
        task_config.warmup_iters,
        task_config.measure_iters,
    );

    let start = Instant::now();
    let cancel = CancelToken::new();
    let outcomes = execute_tasks(&tasks, &task_config, &cancel, true);
    let summaries = compute_summaries(&outcomes, confidence_level);

    print!("{}", format_table(&outcomes, &summaries));
    println!("\nCompleted in {:.2} s.", start.elapsed().as_secs_f64());

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        eprintln!("\n{} task(s) failed", failed);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_selects_matching_tasks() {
        let tasks = filter_tasks("unsafe").unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.id.starts_with("unsafe")));
    }

    #[test]
    fn default_filter_selects_everything() {
        assert_eq!(filter_tasks(".*").unwrap().len(), 6);
    }

    #[test]
    fn invalid_filter_is_an_error() {
        assert!(filter_tasks("[unclosed").is_err());
    }

    #[test]
    fn cli_flags_override_config_file() {
        let cli = Cli::parse_from(["bufbench", "--warmup", "2", "--forks", "3"]);
        let mut config = BufbenchConfig::default();
        config.runner.warmup_iters = 7;
        config.runner.measure_iters = 4;

        let task_config = build_task_config(&cli.args, &config).unwrap();
        assert_eq!(task_config.warmup_iters, 2);
        assert_eq!(task_config.forks, 3);
        // Unset flags fall back to the config file.
        assert_eq!(task_config.measure_iters, 4);
        assert_eq!(task_config.workers, 1);
    }

    #[test]
    fn threads_flag_maps_to_workers() {
        let cli = Cli::parse_from(["bufbench", "-t", "4"]);
        let task_config = build_task_config(&cli.args, &BufbenchConfig::default()).unwrap();
        assert_eq!(task_config.workers, 4);
    }

    #[test]
    fn run_subcommand_accepts_pattern_and_flags() {
        let cli = Cli::try_parse_from(["bufbench", "run", "unsafe", "--warmup", "3"])
            .expect("documented run form must parse");
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.filter, "unsafe");
        assert_eq!(args.warmup, Some(3));
    }

    #[test]
    fn list_subcommand_accepts_pattern() {
        let cli = Cli::try_parse_from(["bufbench", "list", "mapped"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::List { ref filter }) if filter == "mapped"));
    }

    #[test]
    fn bare_form_still_parses() {
        let cli = Cli::parse_from(["bufbench", "heap", "--measure", "5"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.args.filter, "heap");
        assert_eq!(cli.args.measure, Some(5));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let config = BufbenchConfig::default();
        for level in ["1.5", "0.0", "1.0", "-0.2"] {
            let cli = Cli::parse_from(["bufbench", "--confidence", level]);
            assert!(
                resolve_confidence(&cli.args, &config).is_err(),
                "confidence {level} must be rejected before any task runs"
            );
        }
    }

    #[test]
    fn confidence_layering_accepts_valid_levels() {
        let cli = Cli::parse_from(["bufbench", "--confidence", "0.99"]);
        let mut config = BufbenchConfig::default();
        config.runner.confidence_level = 0.5;
        assert_eq!(resolve_confidence(&cli.args, &config).unwrap(), 0.99);

        let bare = Cli::parse_from(["bufbench"]);
        assert_eq!(resolve_confidence(&bare.args, &config).unwrap(), 0.5);
    }

    #[test]
    fn log_filter_covers_every_crate_target() {
        use tracing::Level;
        use tracing_subscriber::filter::Targets;

        let default: Targets = log_directives(false).parse().unwrap();
        // The teardown warning is emitted from bufbench_core::provider and
        // the per-task failure warning from bufbench_cli::executor.
        assert!(default.would_enable("bufbench_core::provider", &Level::WARN));
        assert!(default.would_enable("bufbench_cli::executor", &Level::WARN));
        assert!(!default.would_enable("bufbench_core::runner", &Level::DEBUG));

        let verbose: Targets = log_directives(true).parse().unwrap();
        assert!(verbose.would_enable("bufbench_core::runner", &Level::DEBUG));
        assert!(verbose.would_enable("bufbench_cli::executor", &Level::DEBUG));
    }
}
