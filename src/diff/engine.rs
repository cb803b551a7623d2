//! Core diff engine implementation.
//! Walks two aggregated trees in lock-step and builds differential trees.

use chrono::Utc;
use log::{debug, info};

use super::normalizer::{relative_difference, Metric};
use super::pairing::{pair_elements, PairingRule};
use super::schema::{DiffNodeReport, DiffReport, DiffSummary, GroupReport, SideMetadata};
use super::threshold::{classify, intensity, ChangeKind, ThresholdConfig};
use super::DiffError;
use crate::aggregator::{CallGraph, NodeId};
use crate::callsite::{CallSite, SymbolResolver};
use crate::source::ElementKey;
use crate::utils::cancel::CancellationToken;
use crate::utils::config::SCHEMA_VERSION;

/// One node of a differential tree
///
/// **Public** - weights come from the comparison tree; `difference` is the
/// raw signed ratio against the baseline, `NaN` when the baseline has no
/// counterpart
#[derive(Debug, Clone)]
pub struct DiffNode {
    /// Node of the comparison graph this entry was computed from
    pub base: NodeId,
    pub identity: CallSite,
    pub weight: u64,
    pub difference: f64,
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    pub fn label(&self, resolver: &dyn SymbolResolver) -> String {
        self.identity.resolve_label(resolver)
    }

    /// Whether the call site is absent from the baseline
    pub fn is_new(&self) -> bool {
        self.difference.is_nan()
    }

    pub fn child(&self, identity: &CallSite) -> Option<&DiffNode> {
        self.children.iter().find(|c| &c.identity == identity)
    }

    /// Visit this node and its descendants, depth first
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a DiffNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Differential trees of one element pair
#[derive(Debug, Clone)]
pub struct DiffGroup {
    pub baseline: ElementKey,
    pub comparison: ElementKey,
    pub name: String,
    pub trees: Vec<DiffNode>,
}

/// All differential trees of a comparison
#[derive(Debug, Clone)]
pub struct DiffForest {
    pub metric: Metric,
    /// Rule that paired the elements, `None` for direct root comparisons
    pub rule: Option<PairingRule>,
    pub groups: Vec<DiffGroup>,
}

impl DiffForest {
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        for group in &self.groups {
            for tree in &group.trees {
                tree.walk(&mut |_| count += 1);
            }
        }
        count
    }
}

/// Diff two root sets
///
/// **Public** - the lock-step core of every comparison
///
/// # Arguments
/// * `first` - Baseline graph
/// * `first_roots` - Baseline siblings at this level
/// * `second` - Comparison graph, source of the output weights
/// * `second_roots` - Comparison siblings at this level
/// * `metric` - Node value being compared
///
/// # Returns
/// One `DiffNode` per comparison node. Nodes only present in the baseline
/// produce no output.
pub fn diff_trees(
    first: &CallGraph,
    first_roots: &[NodeId],
    second: &CallGraph,
    second_roots: &[NodeId],
    metric: Metric,
) -> Vec<DiffNode> {
    second_roots
        .iter()
        .map(|&base_id| {
            let base = second.node(base_id);
            let other = first_roots
                .iter()
                .copied()
                .find(|&id| first.node(id).identity() == base.identity());

            let weight = metric.weight(base);
            let difference = match other {
                Some(other) => relative_difference(weight, metric.weight(first.node(other))),
                None => f64::NAN,
            };
            let other_children = other.map(|id| first.node(id).children()).unwrap_or(&[]);

            DiffNode {
                base: base_id,
                identity: base.identity().clone(),
                weight,
                difference,
                children: diff_trees(first, other_children, second, base.children(), metric),
            }
        })
        .collect()
}

/// Diff every paired element of two graphs
///
/// **Public** - main entry point for element-wise comparisons
///
/// # Errors
/// * `DiffError::NoComparableElements` - The element hierarchies have nothing in common
/// * `DiffError::Cancelled` - The token was cancelled between two pairs
pub fn diff_call_graphs(
    baseline: &CallGraph,
    comparison: &CallGraph,
    metric: Metric,
    cancel: &CancellationToken,
) -> Result<DiffForest, DiffError> {
    diff_call_graphs_with_progress(baseline, comparison, metric, cancel, |_, _| {})
}

/// Same as [`diff_call_graphs`], calling `progress(completed, total)` after each pair
pub fn diff_call_graphs_with_progress(
    baseline: &CallGraph,
    comparison: &CallGraph,
    metric: Metric,
    cancel: &CancellationToken,
    mut progress: impl FnMut(usize, usize),
) -> Result<DiffForest, DiffError> {
    let pairing = pair_elements(baseline.elements(), comparison.elements())?;
    info!(
        "Diffing {} element pairs on {} (rule: {})",
        pairing.pairs.len(),
        metric,
        pairing.rule
    );

    let mut groups = Vec::new();
    for (completed, pair) in pairing.pairs.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(DiffError::Cancelled { completed });
        }

        let first_roots = baseline.roots(&pair.first.key);
        let second_roots = comparison.roots(&pair.second.key);
        if second_roots.is_empty() {
            debug!("Skipping {}: no roots to compare", pair.second.key);
        } else {
            groups.push(DiffGroup {
                baseline: pair.first.key.clone(),
                comparison: pair.second.key.clone(),
                name: pair.second.name.clone(),
                trees: diff_trees(baseline, first_roots, comparison, second_roots, metric),
            });
        }
        progress(completed + 1, pairing.pairs.len());
    }

    Ok(DiffForest {
        metric,
        rule: Some(pairing.rule),
        groups,
    })
}

/// Diff one element of each graph directly, without pairing
pub fn diff_elements(
    baseline: &CallGraph,
    baseline_element: &ElementKey,
    comparison: &CallGraph,
    comparison_element: &ElementKey,
    metric: Metric,
) -> DiffForest {
    let name = comparison
        .find_element(comparison_element)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| comparison_element.to_string());
    let trees = diff_trees(
        baseline,
        baseline.roots(baseline_element),
        comparison,
        comparison.roots(comparison_element),
        metric,
    );
    DiffForest {
        metric,
        rule: None,
        groups: vec![DiffGroup {
            baseline: baseline_element.clone(),
            comparison: comparison_element.clone(),
            name,
            trees,
        }],
    }
}

/// Generate the serialisable report of a diff forest
///
/// **Public** - thresholds are not checked here, see `check_thresholds`
///
/// # Arguments
/// * `forest` - Differential trees
/// * `baseline` - Metadata of the baseline side
/// * `target` - Metadata of the comparison side
/// * `resolver` - Label resolution for address call sites
/// * `config` - Classification bands
pub fn generate_report(
    forest: &DiffForest,
    baseline: SideMetadata,
    target: SideMetadata,
    resolver: &dyn SymbolResolver,
    config: &ThresholdConfig,
) -> DiffReport {
    let groups: Vec<GroupReport> = forest
        .groups
        .iter()
        .map(|group| GroupReport {
            name: group.name.clone(),
            baseline_element: group.baseline.to_string(),
            comparison_element: group.comparison.to_string(),
            total_weight: group.trees.iter().map(|t| t.weight).sum(),
            trees: group
                .trees
                .iter()
                .map(|tree| node_report(tree, resolver, config))
                .collect(),
        })
        .collect();

    let mut summary = DiffSummary::passed();
    for group in &groups {
        for tree in &group.trees {
            tree.walk(&mut |_, node| summary.count(node.change));
        }
    }
    if summary.nodes > 0 && summary.nodes == summary.unchanged_nodes {
        summary.warning = Some("Baseline and target are identical".to_string());
    }

    DiffReport {
        diff_version: SCHEMA_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        metric: forest.metric,
        pairing: forest.rule,
        baseline,
        target,
        groups,
        threshold_violations: Vec::new(), // Populated by check_thresholds
        summary,
    }
}

fn node_report(node: &DiffNode, resolver: &dyn SymbolResolver, config: &ThresholdConfig) -> DiffNodeReport {
    let change = classify(node.difference, config.no_difference_band);
    DiffNodeReport {
        label: node.label(resolver),
        weight: node.weight,
        difference: node.difference.is_finite().then_some(node.difference),
        change,
        intensity: match change {
            ChangeKind::New => 0.0,
            _ => intensity(node.difference, config.min_threshold),
        },
        children: node
            .children
            .iter()
            .map(|child| node_report(child, resolver, config))
            .collect(),
    }
}
