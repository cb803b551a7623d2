//! Pairing, merging and differential trees over built call graphs.

use callgraph_studio::aggregator::{build_call_graph, merge_graphs, CallGraph, GraphSnapshot};
use callgraph_studio::callsite::{CallSite, NoResolver};
use callgraph_studio::diff::*;
use callgraph_studio::source::{CallInterval, Element, ElementKey, InMemorySource, TimeRange};
use callgraph_studio::utils::cancel::CancellationToken;

// ============================================================================
// SHARED TEST HELPERS
// ============================================================================

/// Trace with one element per `(path, intervals)` entry
fn trace(name: &str, threads: Vec<(Vec<&str>, Vec<CallInterval>)>) -> InMemorySource {
    let mut source = InMemorySource::new(name);
    for (path, intervals) in threads {
        let key = source.add_element(&path);
        for interval in intervals {
            source.add_interval(&key, interval);
        }
    }
    source
}

fn build(source: &InMemorySource) -> CallGraph {
    let (graph, _) = build_call_graph(source, TimeRange::ETERNITY, &CancellationToken::new())
        .expect("build failed");
    graph
}

fn main_calls(main_end: u64, work_end: u64) -> Vec<CallInterval> {
    vec![
        CallInterval::new(0, "main", 0, main_end),
        CallInterval::new(1, "work", 0, work_end),
    ]
}

// ============================================================================
// COMPONENT TESTS: PAIRING
// ============================================================================

mod pairing_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_threads_pair_as_singletons() {
        let a = build(&trace("a", vec![(vec!["t1"], main_calls(99, 49))]));
        let b = build(&trace("b", vec![(vec!["t2"], main_calls(99, 49))]));

        let pairing = pair_elements(a.elements(), b.elements()).unwrap();
        assert_eq!(pairing.rule, PairingRule::Singleton);
        assert_eq!(pairing.pairs.len(), 1);
        assert_eq!(pairing.pairs[0].first.name, "t1");
        assert_eq!(pairing.pairs[0].second.name, "t2");
    }

    #[test]
    fn test_same_trace_pairs_by_identity() {
        let source = trace(
            "run",
            vec![
                (vec!["proc", "1"], main_calls(99, 49)),
                (vec!["proc", "2"], main_calls(59, 9)),
            ],
        );
        let a = build(&source);
        let b = build(&source);

        let pairing = pair_elements(a.elements(), b.elements()).unwrap();
        assert_eq!(pairing.rule, PairingRule::Identity);
        // the process and both threads
        assert_eq!(pairing.pairs.len(), 3);
        assert!(pairing.pairs.iter().all(|p| p.first.key == p.second.key));
    }

    #[test]
    fn test_other_traces_pair_by_name() {
        let a = build(&trace(
            "before",
            vec![
                (vec!["server", "worker"], main_calls(99, 49)),
                (vec!["server", "io"], main_calls(99, 49)),
            ],
        ));
        let b = build(&trace(
            "after",
            vec![
                (vec!["server", "io"], main_calls(99, 49)),
                (vec!["server", "worker"], main_calls(99, 49)),
            ],
        ));

        let pairing = pair_elements(a.elements(), b.elements()).unwrap();
        assert_eq!(pairing.rule, PairingRule::Name);
        let names: Vec<(&str, &str)> = pairing
            .pairs
            .iter()
            .map(|p| (p.first.name.as_str(), p.second.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![("server", "server"), ("worker", "worker"), ("io", "io")]
        );
    }

    #[test]
    fn test_unrelated_hierarchies_do_not_pair() {
        let a = build(&trace("a", vec![(vec!["x", "1"], main_calls(9, 4))]));
        let b = build(&trace("b", vec![(vec!["y", "2"], main_calls(9, 4))]));

        let err = pair_elements(a.elements(), b.elements()).unwrap_err();
        assert!(matches!(err, DiffError::NoComparableElements));
    }
}

// ============================================================================
// COMPONENT TESTS: MERGER
// ============================================================================

mod merger_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn group() -> Element {
        Element::new(ElementKey::new("Merge", &["Merge"]), "Merge")
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = build(&trace(
            "a",
            vec![(
                vec!["t"],
                vec![
                    CallInterval::new(0, "main", 0, 99),
                    CallInterval::new(1, "read", 0, 29),
                    CallInterval::new(1, "write", 40, 59),
                ],
            )],
        ));
        let b = build(&trace(
            "b",
            vec![(
                vec!["t"],
                vec![
                    CallInterval::new(0, "main", 0, 49),
                    CallInterval::new(1, "read", 0, 9),
                    CallInterval::new(2, "decode", 0, 4),
                    CallInterval::new(0, "idle", 60, 69),
                ],
            )],
        ));

        let ab = merge_graphs(&[&a, &b], group());
        let ba = merge_graphs(&[&b, &a], group());
        ab.assert_invariants();
        ba.assert_invariants();

        let ab = GraphSnapshot::capture(&ab, &NoResolver);
        let ba = GraphSnapshot::capture(&ba, &NoResolver);
        assert_eq!(ab, ba);

        let roots = ab.roots("Merge:/Merge").unwrap();
        let labels: Vec<&str> = roots.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["idle", "main"]);
        let main = &roots[1];
        assert_eq!(main.duration, 150);
        assert_eq!(main.call_count, 2);
        assert_eq!(main.self_time, 150 - 40 - 20);
        assert_eq!(main.child("read").unwrap().child("decode").unwrap().duration, 5);
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let a = build(&trace("a", vec![(vec!["t"], main_calls(99, 49))]));
        let before = GraphSnapshot::capture(&a, &NoResolver);
        let _ = merge_graphs(&[&a, &a], group());
        assert_eq!(GraphSnapshot::capture(&a, &NoResolver), before);
    }
}

// ============================================================================
// INTEGRATION TESTS: DIFFERENTIAL TREES
// ============================================================================

mod engine_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paired_threads_diff() {
        let a = build(&trace(
            "before",
            vec![
                (vec!["server", "worker"], main_calls(99, 49)),
                (vec!["server", "io"], main_calls(99, 49)),
            ],
        ));
        let b = build(&trace(
            "after",
            vec![
                (vec!["server", "worker"], main_calls(199, 49)),
                (vec!["server", "io"], main_calls(99, 49)),
            ],
        ));

        let forest = diff_call_graphs(&a, &b, Metric::Duration, &CancellationToken::new()).unwrap();
        assert_eq!(forest.rule, Some(PairingRule::Name));
        // "server" has no roots of its own
        assert_eq!(forest.groups.len(), 2);

        let worker = forest.groups.iter().find(|g| g.name == "worker").unwrap();
        let main = &worker.trees[0];
        assert_eq!(main.weight, 200);
        assert_eq!(main.difference, 1.0);
        let work = main.child(&CallSite::function("work")).unwrap();
        assert_eq!(work.difference, 0.0);

        let io = forest.groups.iter().find(|g| g.name == "io").unwrap();
        io.trees[0].walk(&mut |node| assert_eq!(node.difference, 0.0));
    }

    #[test]
    fn test_new_and_removed_call_sites() {
        let a = build(&trace(
            "a",
            vec![(
                vec!["t"],
                vec![
                    CallInterval::new(0, "main", 0, 99),
                    CallInterval::new(1, "legacy", 0, 49),
                ],
            )],
        ));
        let b = build(&trace(
            "b",
            vec![(
                vec!["t"],
                vec![
                    CallInterval::new(0, "main", 0, 99),
                    CallInterval::new(1, "fresh", 0, 49),
                ],
            )],
        ));

        let forest = diff_call_graphs(&a, &b, Metric::Duration, &CancellationToken::new()).unwrap();
        let main = &forest.groups[0].trees[0];
        assert_eq!(main.children.len(), 1);
        let fresh = &main.children[0];
        assert_eq!(fresh.identity, CallSite::function("fresh"));
        assert!(fresh.is_new());

        let report = generate_report(
            &forest,
            SideMetadata::default(),
            SideMetadata::default(),
            &NoResolver,
            &ThresholdConfig::default(),
        );
        assert_eq!(report.summary.nodes, 2);
        assert_eq!(report.summary.new_nodes, 1);
        assert_eq!(report.summary.unchanged_nodes, 1);
        let fresh = report.find("t", &["main", "fresh"]).unwrap();
        assert_eq!(fresh.change, ChangeKind::New);
        assert_eq!(fresh.difference, None);
    }

    #[test]
    fn test_self_time_metric_on_built_graphs() {
        let a = build(&trace("a", vec![(vec!["t"], main_calls(99, 49))]));
        let b = build(&trace("b", vec![(vec!["t"], main_calls(99, 74))]));

        let forest = diff_call_graphs(&a, &b, Metric::SelfTime, &CancellationToken::new()).unwrap();
        let main = &forest.groups[0].trees[0];
        // self time 50 -> 25
        assert_eq!(main.weight, 25);
        assert_eq!(main.difference, -0.5);
        let work = &main.children[0];
        assert_eq!(work.weight, 75);
        assert_eq!(work.difference, 0.5);
    }

    #[test]
    fn test_threshold_paths_follow_labels() {
        let a = build(&trace("a", vec![(vec!["t"], main_calls(99, 49))]));
        let b = build(&trace("b", vec![(vec!["t"], main_calls(99, 89))]));
        let forest = diff_call_graphs(&a, &b, Metric::Duration, &CancellationToken::new()).unwrap();

        let config = ThresholdConfig {
            max_increase_percent: Some(50.0),
            ..Default::default()
        };
        let mut report = generate_report(
            &forest,
            SideMetadata::default(),
            SideMetadata::default(),
            &NoResolver,
            &config,
        );
        let violations = check_thresholds(&mut report, &config);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "t:main;work");
        assert_eq!(violations[0].metric, "Duration.max_increase_percent");
        assert_eq!(violations[0].actual, Some(80.0));
        assert_eq!(report.summary.status, "FAILED");
    }
}
