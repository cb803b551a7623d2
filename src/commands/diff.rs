//! Diff command implementation.
//! Orchestrates the comparison of two sets of traces and reports
//! differences and violations.

use super::models::DiffArgs;
use crate::comparison::ComparisonContext;
use crate::diff::output::render_terminal_diff;
use crate::diff::{load_thresholds, DiffReport};
use crate::output::write_report;
use crate::source::{load_dump, InMemorySource, IntervalSource};
use crate::utils::config::{load_config, ComparisonConfig};
use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;

/// Execute the diff command
///
/// **Public** - fails when a threshold reports a regression
pub fn execute_diff(args: DiffArgs) -> Result<DiffReport> {
    // Step 1: Resolve the configuration
    let config = resolve_config(&args)?;

    // Step 2: Load traces
    let baseline = load_dumps(&args.baseline, "baseline")?;
    let target = load_dumps(&args.target, "target")?;
    let baseline_refs: Vec<&dyn IntervalSource> =
        baseline.iter().map(|s| s as &dyn IntervalSource).collect();
    let target_refs: Vec<&dyn IntervalSource> =
        target.iter().map(|s| s as &dyn IntervalSource).collect();

    // Step 3: Compare
    let outcome = ComparisonContext::new(config)
        .run(&baseline_refs, &target_refs)
        .context("Failed to compare call graphs")?;
    let report = outcome.report;

    // Step 4: Write output if requested
    if let Some(path) = &args.output {
        write_report(&report, path).context("Failed to write diff report JSON")?;
        println!("Diff report written to {}", path.display().to_string().cyan());
    }

    // Step 5: Terminal Summary
    if args.summary {
        println!("{}", render_terminal_diff(&report));
    }

    // Step 6: Final status
    if report.summary.status == "FAILED" {
        return Err(anyhow::anyhow!(
            "Regression detected against thresholds ({} violations)",
            report.summary.violation_count
        ));
    }

    Ok(report)
}

/// Merge the configuration file with the command-line overrides
fn resolve_config(args: &DiffArgs) -> Result<ComparisonConfig> {
    let mut config = match &args.config_file {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ComparisonConfig::default(),
    };

    if let Some(metric) = args.metric {
        config.metric = metric;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if args.baseline_window.is_some() {
        config.baseline_window = args.baseline_window;
    }
    if args.target_window.is_some() {
        config.target_window = args.target_window;
    }
    if args.average_runs {
        config.average_runs = true;
    }
    if let Some(path) = &args.threshold_file {
        config.thresholds = load_thresholds(path).context("Failed to load threshold file")?;
    }
    if let Some(percent) = args.threshold_percent {
        config.thresholds.max_increase_percent = Some(percent);
    }

    config.validate().context("Invalid comparison configuration")?;
    Ok(config)
}

fn load_dumps(paths: &[PathBuf], side: &str) -> Result<Vec<InMemorySource>> {
    paths
        .iter()
        .map(|path| {
            load_dump(path)
                .with_context(|| format!("Failed to load {} dump {}", side, path.display()))
        })
        .collect()
}
