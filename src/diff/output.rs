//! Terminal output rendering for diff reports.
//!
//! Provides human-readable summaries of call graph comparisons with colour
//! cues for regressions and improvements.

use super::schema::DiffReport;
use super::threshold::ChangeKind;
use colored::*;

/// Largest changes listed in the summary
const TOP_CHANGES: usize = 10;

/// Render a human-readable summary of a diff report for the terminal
pub fn render_terminal_diff(report: &DiffReport) -> String {
    let mut out = String::new();

    out.push_str(&render_header(report));
    out.push_str(&render_groups(report));
    out.push_str(&render_top_changes(report));
    out.push_str(&render_violations(report));
    out.push_str(&render_status(report));

    out
}

fn render_header(report: &DiffReport) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&"Call Graph Comparison Summary".bold().to_string());
    out.push_str("\n---------------------------------------------------\n");
    out.push_str(&format!("Metric:   {}\n", report.metric));
    out.push_str(&format!("Baseline: {}\n", report.baseline.traces.join(", ")));
    out.push_str(&format!("Target:   {}\n", report.target.traces.join(", ")));
    if let Some(rule) = report.pairing {
        out.push_str(&format!("Pairing:  {}\n", rule));
    }
    out.push_str("---------------------------------------------------\n\n");
    out
}

fn render_groups(report: &DiffReport) -> String {
    let mut out = String::new();
    let delta = relative_change(report.target.total_weight, report.baseline.total_weight);
    out.push_str(&format!(
        "{} Total {}: {} -> {} ({})\n",
        delta_symbol(delta),
        report.metric,
        report.baseline.total_weight,
        report.target.total_weight,
        format_percent(delta)
    ));

    let summary = &report.summary;
    out.push_str(&format!(
        "  {} nodes: {} slower, {} faster, {} new, {} unchanged\n",
        summary.nodes,
        summary.slower_nodes.to_string().red(),
        summary.faster_nodes.to_string().green(),
        summary.new_nodes.to_string().yellow(),
        summary.unchanged_nodes
    ));

    for group in &report.groups {
        out.push_str(&format!(
            "  {} ({} roots, weight {})\n",
            group.name,
            group.trees.len(),
            group.total_weight
        ));
    }
    out
}

struct Change {
    stack: String,
    weight: u64,
    difference: f64,
    slower: bool,
}

fn render_top_changes(report: &DiffReport) -> String {
    let mut changes: Vec<Change> = Vec::new();
    for group in &report.groups {
        for tree in &group.trees {
            tree.walk(&mut |path, node| {
                if let (ChangeKind::Slower | ChangeKind::Faster, Some(difference)) =
                    (node.change, node.difference)
                {
                    changes.push(Change {
                        stack: shorten_stack(&path.join(";")),
                        weight: node.weight,
                        difference,
                        slower: node.change == ChangeKind::Slower,
                    });
                }
            });
        }
    }
    if changes.is_empty() {
        return String::new();
    }

    changes.sort_by(|a, b| b.difference.abs().total_cmp(&a.difference.abs()));

    let mut out = String::from("\nTop Changes:\n");
    for change in changes.iter().take(TOP_CHANGES) {
        let line = format!(
            "  {} {}: {} ({})",
            delta_symbol(change.difference),
            change.stack,
            change.weight,
            format_percent(change.difference)
        );
        let line = if change.slower { line.red() } else { line.green() };
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

fn render_violations(report: &DiffReport) -> String {
    let mut out = String::new();
    if report.threshold_violations.is_empty() {
        return out;
    }
    out.push_str("\nThreshold Violations:\n");
    for violation in &report.threshold_violations {
        let actual = violation
            .actual
            .map(|a| format!("{:.2}%", a))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "  [{}] {} {} (limit {:.2}%, actual {})\n",
            violation.severity, violation.metric, violation.path, violation.threshold, actual
        ));
    }
    out
}

fn render_status(report: &DiffReport) -> String {
    let mut out = String::new();
    out.push_str("\n---------------------------------------------------\n");
    let status_msg = match report.summary.status.as_str() {
        "FAILED" => format!(
            "STATUS: REGRESSION DETECTED ({} violations)",
            report.summary.violation_count
        )
        .red()
        .bold(),
        "WARNING" => format!("STATUS: WARNING ({} violations)", report.summary.violation_count)
            .yellow()
            .bold(),
        _ => "STATUS: PASSED".green().bold(),
    };
    out.push_str(&status_msg.to_string());
    out.push('\n');
    if let Some(warning) = &report.summary.warning {
        out.push_str(&format!("{}\n", warning.yellow()));
    }
    out
}

fn relative_change(target: u64, baseline: u64) -> f64 {
    super::normalizer::relative_difference(target, baseline)
}

fn format_percent(difference: f64) -> String {
    if difference.is_infinite() {
        "new weight".to_string()
    } else {
        format!("{:+.2}%", super::normalizer::as_percent(difference))
    }
}

fn delta_symbol(change: f64) -> &'static str {
    if change > 0.0 {
        "▲"
    } else if change < 0.0 {
        "▼"
    } else {
        "="
    }
}

fn shorten_stack(stack: &str) -> String {
    let parts: Vec<&str> = stack.split(';').collect();
    if parts.len() <= 2 {
        stack.to_string()
    } else {
        format!("...;{};{}", parts[parts.len() - 2], parts[parts.len() - 1])
    }
}
