//! End-to-end comparison of two sets of traces.
//!
//! A [`ComparisonContext`] carries everything one comparison needs: the
//! configuration and the cancellation token. Nothing is shared between
//! comparisons, so several can run side by side.

use log::{info, warn};

use crate::aggregator::{absorb, average, build_call_graph, merge_graphs, BuildReport, CallGraph};
use crate::callsite::ResolverChain;
use crate::diff::{
    check_thresholds, diff_call_graphs, diff_elements, generate_report, DiffError, DiffForest,
    DiffReport, Metric, SideMetadata, ThresholdViolation,
};
use crate::source::{Element, ElementKey, IntervalSource, TimeRange};
use crate::utils::cancel::CancellationToken;
use crate::utils::config::{ComparisonConfig, ComparisonMode};

/// Everything produced by one comparison
#[derive(Debug)]
pub struct ComparisonOutcome {
    /// Graph the differences are measured against
    pub baseline: CallGraph,
    /// Graph the differential weights come from
    pub target: CallGraph,
    pub forest: DiffForest,
    pub report: DiffReport,
    pub violations: Vec<ThresholdViolation>,
}

impl ComparisonOutcome {
    /// Whether a threshold marked this comparison as a regression
    pub fn failed(&self) -> bool {
        self.report.summary.has_regressions
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonContext {
    config: ComparisonConfig,
    cancel: CancellationToken,
}

struct Side {
    graph: CallGraph,
    traces: Vec<String>,
    report: BuildReport,
}

impl ComparisonContext {
    pub fn new(config: ComparisonConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Compare the traces of side A (baseline) with those of side B (target)
    ///
    /// **Public** - main entry point of the library
    ///
    /// # Arguments
    /// * `baseline` - Traces of side A
    /// * `target` - Traces of side B
    ///
    /// # Returns
    /// The built graphs, the differential trees and the checked report
    ///
    /// # Errors
    /// * `DiffError::NoTraces` - A side has no trace
    /// * `DiffError::Build` - Building a side failed or was cancelled
    /// * `DiffError::NoComparableElements` - Paired mode found nothing to pair
    /// * `DiffError::Cancelled` - Cancelled while diffing
    pub fn run(
        &self,
        baseline: &[&dyn IntervalSource],
        target: &[&dyn IntervalSource],
    ) -> Result<ComparisonOutcome, DiffError> {
        if baseline.is_empty() {
            return Err(DiffError::NoTraces("baseline"));
        }
        if target.is_empty() {
            return Err(DiffError::NoTraces("target"));
        }

        let metric = self.config.metric;
        info!(
            "Comparing {} baseline trace(s) with {} target trace(s) on {} ({:?})",
            baseline.len(),
            target.len(),
            metric,
            self.config.mode
        );

        let base_side = self.build_side(baseline, self.config.baseline_window)?;
        let target_side = self.build_side(target, self.config.target_window)?;

        let forest = match self.config.mode {
            ComparisonMode::Merged => {
                let key = self.group_key();
                diff_elements(&base_side.graph, &key, &target_side.graph, &key, metric)
            }
            ComparisonMode::Paired => {
                diff_call_graphs(&base_side.graph, &target_side.graph, metric, &self.cancel)?
            }
        };

        // Target symbols first: the differential labels come from that side
        let mut resolver = ResolverChain::new();
        for source in target.iter().chain(baseline.iter()) {
            resolver.push(Box::new(source.symbols()));
        }

        let base_meta = side_metadata(&base_side, self.config.baseline_window, metric);
        let target_meta = side_metadata(&target_side, self.config.target_window, metric);
        let thresholds = &self.config.thresholds;
        let mut report = generate_report(&forest, base_meta, target_meta, &resolver, thresholds);
        let violations = check_thresholds(&mut report, thresholds);

        info!(
            "Comparison {}: {} nodes, {} violations",
            report.summary.status,
            report.summary.nodes,
            violations.len()
        );

        Ok(ComparisonOutcome {
            baseline: base_side.graph,
            target: target_side.graph,
            forest,
            report,
            violations,
        })
    }

    fn group_key(&self) -> ElementKey {
        ElementKey::new(self.config.group_name.clone(), &[self.config.group_name.as_str()])
    }

    fn build_side(
        &self,
        sources: &[&dyn IntervalSource],
        window: Option<TimeRange>,
    ) -> Result<Side, DiffError> {
        let mut graphs = Vec::with_capacity(sources.len());
        let mut report = BuildReport::default();
        let mut traces = Vec::with_capacity(sources.len());

        for source in sources {
            let requested = window.unwrap_or_default();
            let bounds = source.time_bounds();
            let clamped = requested.intersect(&bounds).unwrap_or_else(|| {
                warn!(
                    "Window {} misses trace {} (bounds {})",
                    requested,
                    source.trace_name(),
                    bounds
                );
                requested
            });

            let (graph, build_report) = build_call_graph(*source, clamped, &self.cancel)?;
            report.absorb(&build_report);
            traces.push(source.trace_name().to_string());
            graphs.push(graph);
        }

        let graph = match self.config.mode {
            ComparisonMode::Merged => {
                let group = Element::new(self.group_key(), self.config.group_name.clone());
                let refs: Vec<&CallGraph> = graphs.iter().collect();
                let mut merged = merge_graphs(&refs, group);
                if self.config.average_runs {
                    average(&mut merged, graphs.len() as u64)?;
                }
                merged
            }
            ComparisonMode::Paired => {
                let mut combined = CallGraph::new();
                for graph in &graphs {
                    absorb(&mut combined, graph);
                }
                combined
            }
        };

        Ok(Side {
            graph,
            traces,
            report,
        })
    }
}

fn side_metadata(side: &Side, window: Option<TimeRange>, metric: Metric) -> SideMetadata {
    let total_weight = side
        .graph
        .elements_with_roots()
        .into_iter()
        .flat_map(|key| side.graph.roots(key))
        .map(|id| metric.weight(side.graph.node(*id)))
        .sum();

    SideMetadata {
        traces: side.traces.clone(),
        window,
        total_weight,
        intervals: side.report.intervals,
        malformed: side.report.malformed,
    }
}
