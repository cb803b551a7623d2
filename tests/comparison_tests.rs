use callgraph_studio::aggregator::BuildError;
use callgraph_studio::comparison::ComparisonContext;
use callgraph_studio::diff::{ChangeKind, DiffError, PairingRule, ThresholdConfig};
use callgraph_studio::source::{CallInterval, InMemorySource, IntervalSource, TimeRange};
use callgraph_studio::utils::cancel::CancellationToken;
use callgraph_studio::utils::config::{ComparisonConfig, ComparisonMode};

fn run_trace(name: &str, main_end: u64, work_end: u64) -> InMemorySource {
    let mut source = InMemorySource::new(name);
    let thread = source.add_element(&["app", "main-thread"]);
    source.add_interval(&thread, CallInterval::new(0, "main", 0, main_end));
    source.add_interval(&thread, CallInterval::new(1, "work", 0, work_end));
    source
}

fn context(config: ComparisonConfig) -> ComparisonContext {
    ComparisonContext::new(config)
}

#[test]
fn test_merged_runs_are_summed_by_default() {
    let a1 = run_trace("a1", 99, 49);
    let a2 = run_trace("a2", 99, 49);
    let b = run_trace("b", 149, 49);

    let outcome = ComparisonContext::default()
        .run(&[&a1, &a2], &[&b])
        .unwrap();

    assert_eq!(outcome.forest.rule, None);
    assert_eq!(outcome.report.baseline.traces, vec!["a1", "a2"]);
    assert_eq!(outcome.report.baseline.total_weight, 200);
    let main = outcome.report.find("Merge", &["main"]).unwrap();
    assert_eq!(main.difference, Some(-0.25));
    assert_eq!(main.change, ChangeKind::Faster);
}

#[test]
fn test_average_runs_divides_once() {
    let a1 = run_trace("a1", 99, 49);
    let a2 = run_trace("a2", 99, 49);
    let a3 = run_trace("a3", 99, 49);
    let b = run_trace("b", 149, 49);

    let config = ComparisonConfig {
        average_runs: true,
        ..Default::default()
    };
    let outcome = context(config).run(&[&a1, &a2, &a3], &[&b]).unwrap();

    assert_eq!(outcome.report.baseline.total_weight, 100);
    let main = outcome.report.find("Merge", &["main"]).unwrap();
    assert_eq!(main.difference, Some(0.5));
    let work = outcome.report.find("Merge", &["main", "work"]).unwrap();
    assert_eq!(work.difference, Some(0.0));
    assert_eq!(work.change, ChangeKind::Unchanged);
}

#[test]
fn test_custom_group_name() {
    let a = run_trace("a", 99, 49);
    let b = run_trace("b", 99, 49);
    let config = ComparisonConfig {
        group_name: "all-runs".to_string(),
        ..Default::default()
    };
    let outcome = context(config).run(&[&a], &[&b]).unwrap();

    let group = &outcome.report.groups[0];
    assert_eq!(group.name, "all-runs");
    assert_eq!(group.comparison_element, "all-runs:/all-runs");
    assert_eq!(
        outcome.report.summary.warning.as_deref(),
        Some("Baseline and target are identical")
    );
}

#[test]
fn test_windows_apply_per_side() {
    let a = run_trace("a", 99, 49);
    let b = run_trace("b", 99, 49);
    let config = ComparisonConfig {
        baseline_window: Some(TimeRange::new(0, 49)),
        ..Default::default()
    };
    let outcome = context(config).run(&[&a], &[&b]).unwrap();

    assert_eq!(outcome.report.baseline.window, Some(TimeRange::new(0, 49)));
    assert_eq!(outcome.report.target.window, None);
    let main = outcome.report.find("Merge", &["main"]).unwrap();
    assert_eq!(main.weight, 100);
    assert_eq!(main.difference, Some(1.0));
}

#[test]
fn test_paired_mode_pairs_threads_by_name() {
    let a = run_trace("a", 99, 49);
    let b = run_trace("b", 199, 49);
    let config = ComparisonConfig {
        mode: ComparisonMode::Paired,
        ..Default::default()
    };
    let outcome = context(config).run(&[&a], &[&b]).unwrap();

    assert_eq!(outcome.forest.rule, Some(PairingRule::Name));
    assert_eq!(outcome.report.pairing, Some(PairingRule::Name));
    let group = outcome
        .report
        .groups
        .iter()
        .find(|g| g.name == "main-thread")
        .unwrap();
    assert_eq!(group.baseline_element, "a:/app/main-thread");
    assert_eq!(group.comparison_element, "b:/app/main-thread");
    assert_eq!(group.trees[0].difference, Some(1.0));
}

#[test]
fn test_paired_mode_without_common_elements() {
    let a = run_trace("a", 99, 49);
    let mut b = InMemorySource::new("b");
    let other = b.add_element(&["daemon", "io"]);
    b.add_interval(&other, CallInterval::new(0, "main", 0, 9));

    let config = ComparisonConfig {
        mode: ComparisonMode::Paired,
        ..Default::default()
    };
    let err = context(config).run(&[&a], &[&b]).unwrap_err();
    assert!(matches!(err, DiffError::NoComparableElements));
}

#[test]
fn test_labels_resolve_target_symbols_first() {
    let mut a = InMemorySource::new("a");
    let thread = a.add_element(&["t"]);
    a.add_symbol(0x10, "old_name");
    a.add_symbol(0x20, "helper");
    a.add_interval(&thread, CallInterval::new(0, 0x10u64, 0, 99));
    a.add_interval(&thread, CallInterval::new(1, 0x20u64, 0, 9));

    let mut b = InMemorySource::new("b");
    let thread = b.add_element(&["t"]);
    b.add_symbol(0x10, "new_name");
    b.add_interval(&thread, CallInterval::new(0, 0x10u64, 0, 99));
    b.add_interval(&thread, CallInterval::new(1, 0x20u64, 0, 9));
    b.add_interval(&thread, CallInterval::new(1, 0x30u64, 10, 19));

    let outcome = ComparisonContext::default().run(&[&a], &[&b]).unwrap();
    let root = outcome.report.find("Merge", &["new_name"]).unwrap();
    assert!(root.child("helper").is_some());
    let unknown = root.child("0x30").unwrap();
    assert_eq!(unknown.change, ChangeKind::New);
}

#[test]
fn test_threshold_failure() {
    let a = run_trace("a", 99, 49);
    let b = run_trace("b", 119, 49);
    let config = ComparisonConfig {
        thresholds: ThresholdConfig {
            max_increase_percent: Some(10.0),
            ..Default::default()
        },
        ..Default::default()
    };
    let outcome = context(config).run(&[&a], &[&b]).unwrap();

    assert!(outcome.failed());
    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(outcome.violations[0].path, "Merge:main");
    assert_eq!(outcome.report.summary.status, "FAILED");
}

#[test]
fn test_cancelled_before_build() {
    let a = run_trace("a", 99, 49);
    let b = run_trace("b", 99, 49);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ComparisonContext::default()
        .with_cancel(cancel)
        .run(&[&a], &[&b])
        .unwrap_err();
    assert!(matches!(
        err,
        DiffError::Build(BuildError::Cancelled { completed: 0, .. })
    ));
}

#[test]
fn test_contexts_are_independent() {
    let a = run_trace("a", 99, 49);
    let b = run_trace("b", 149, 49);
    let sources: [&dyn IntervalSource; 1] = [&a];

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let first = ComparisonContext::default().with_cancel(cancelled);
    let second = ComparisonContext::default();

    assert!(first.run(&sources, &[&b]).is_err());
    assert!(second.run(&sources, &[&b]).is_ok());
}
