//! Callgraph Studio CLI
//!
//! Builds aggregated calling-context trees from interval dumps and compares
//! them across traces.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use callgraph_studio::commands::{
    display_version, execute_build, execute_diff, parse_window, validate_dump_file, BuildArgs,
    DiffArgs,
};
use callgraph_studio::diff::Metric;
use callgraph_studio::source::TimeRange;
use callgraph_studio::utils::config::ComparisonMode;

/// Callgraph Studio - calling-context trees and differential call graphs
#[derive(Parser, Debug)]
#[command(name = "callgraph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate an interval dump into its calling-context trees
    Build {
        /// Path to the interval dump JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Output path for the JSON snapshot (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Time window as START:END, whole trace when omitted
        #[arg(short, long, value_parser = parse_window)]
        window: Option<TimeRange>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Compare baseline traces against target traces
    Diff {
        /// Baseline interval dumps
        #[arg(short, long, required = true, num_args = 1..)]
        baseline: Vec<PathBuf>,

        /// Target interval dumps
        #[arg(short, long, required = true, num_args = 1..)]
        target: Vec<PathBuf>,

        /// Comparison configuration file (TOML)
        #[arg(short, long, env = "CALLGRAPH_CONFIG")]
        config: Option<PathBuf>,

        /// Metric to compare (duration, self_time)
        #[arg(short, long)]
        metric: Option<Metric>,

        /// How the two sides are matched
        #[arg(long, value_enum)]
        mode: Option<ComparisonMode>,

        /// Baseline time window as START:END
        #[arg(long, value_parser = parse_window)]
        baseline_window: Option<TimeRange>,

        /// Target time window as START:END
        #[arg(long, value_parser = parse_window)]
        target_window: Option<TimeRange>,

        /// Average each merged side over its traces
        #[arg(long)]
        average: bool,

        /// Threshold configuration file (TOML)
        #[arg(long)]
        threshold: Option<PathBuf>,

        /// Maximum allowed increase percentage of any node
        #[arg(long)]
        threshold_percent: Option<f64>,

        /// Output path for the JSON diff report (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print terminal summary
        #[arg(long)]
        summary: bool,
    },

    /// Validate an interval dump file
    Validate {
        /// Path to interval dump JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Build {
            input,
            output,
            window,
            summary,
        } => {
            execute_build(BuildArgs {
                input,
                output,
                window,
                print_summary: summary,
            })?;
        }

        Commands::Diff {
            baseline,
            target,
            config,
            metric,
            mode,
            baseline_window,
            target_window,
            average,
            threshold,
            threshold_percent,
            output,
            summary,
        } => {
            execute_diff(DiffArgs {
                baseline,
                target,
                config_file: config,
                metric,
                mode,
                baseline_window,
                target_window,
                average_runs: average,
                threshold_file: threshold,
                threshold_percent,
                output,
                summary,
            })?;
        }

        Commands::Validate { file } => {
            validate_dump_file(&file)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
