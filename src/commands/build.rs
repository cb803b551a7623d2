//! Build command implementation.
//!
//! The build command:
//! 1. Loads an interval dump
//! 2. Aggregates every thread into its calling-context tree
//! 3. Writes the sorted snapshot

use crate::aggregator::{build_call_graph, GraphSnapshot, NodeSnapshot};
use crate::output::write_snapshot;
use crate::source::{load_dump, IntervalSource};
use crate::utils::cancel::CancellationToken;
use anyhow::{Context, Result};
use log::{debug, info};
use std::time::Instant;

use super::models::BuildArgs;

/// Execute the build command
///
/// **Public** - main entry point called from main.rs
///
/// # Returns
/// The snapshot of the aggregated graph
///
/// # Errors
/// * Dump read or validation failures
/// * File write errors
pub fn execute_build(args: BuildArgs) -> Result<GraphSnapshot> {
    let start_time = Instant::now();

    // Step 1: Load the dump
    info!("Step 1/3: Loading interval dump {}...", args.input.display());
    let source = load_dump(&args.input)
        .with_context(|| format!("Failed to load interval dump {}", args.input.display()))?;

    // Step 2: Aggregate
    let window = args.window.unwrap_or_default();
    info!("Step 2/3: Building call graph over {}...", window);
    let (graph, report) = build_call_graph(&source, window, &CancellationToken::new())
        .context("Failed to build call graph")?;
    graph.assert_invariants();
    debug!("{} nodes, {} malformed intervals", graph.node_count(), report.malformed);

    let snapshot = GraphSnapshot::capture(&graph, &source.symbols());

    // Step 3: Write outputs
    if let Some(path) = &args.output {
        info!("Step 3/3: Writing snapshot...");
        write_snapshot(&snapshot, path).context("Failed to write call graph snapshot")?;
        info!("✓ Snapshot written to: {}", path.display());
    } else {
        info!("Step 3/3: Skipping snapshot output (not requested)");
    }

    if args.print_summary {
        println!("\n{}", "=".repeat(80));
        println!("CALL GRAPH SUMMARY");
        println!("{}", "=".repeat(80));
        println!("Trace:      {}", source.trace_name());
        println!("Elements:   {}", report.elements);
        println!("Intervals:  {}", report.intervals);
        println!("Statuses:   {}", report.statuses);
        println!("Malformed:  {}", report.malformed);
        println!("Nodes:      {}", graph.node_count());
        for element in &snapshot.elements {
            println!("\n{} ({}), total {}", element.name, element.element, element.total_duration);
            let mut roots: Vec<&NodeSnapshot> = element.roots.iter().collect();
            roots.sort_by(|a, b| b.duration.cmp(&a.duration));
            for root in roots.iter().take(10) {
                println!(
                    "  {:<40} duration {:>10}  self {:>10}  calls {:>6}  depth {}",
                    root.label, root.duration, root.self_time, root.call_count, root.max_depth
                );
            }
        }
        println!("{}", "=".repeat(80));
    }

    let elapsed = start_time.elapsed();
    info!("Build completed in {:.2}s", elapsed.as_secs_f64());

    Ok(snapshot)
}
