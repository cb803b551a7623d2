//! Schema definitions for diff reports.
//!
//! Defines the structures that represent differences between two sets of
//! aggregated call trees.

use serde::{Deserialize, Serialize};

use super::normalizer::Metric;
use super::pairing::PairingRule;
use super::threshold::ChangeKind;
use crate::source::TimeRange;

/// Complete diff report comparing baseline and target traces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Schema version for the diff format
    pub diff_version: String,

    /// Timestamp when diff was generated
    pub generated_at: String,

    /// Node value the differences are computed on
    pub metric: Metric,

    /// Rule that paired the elements, absent for merged comparisons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing: Option<PairingRule>,

    /// Metadata of the baseline side
    pub baseline: SideMetadata,

    /// Metadata of the target side
    pub target: SideMetadata,

    /// Differential trees, one group per compared element
    pub groups: Vec<GroupReport>,

    /// List of threshold violations (if any)
    pub threshold_violations: Vec<ThresholdViolation>,

    /// Summary of diff results
    pub summary: DiffSummary,
}

impl DiffReport {
    /// Find a node by following labels from the roots of a group
    pub fn find(&self, group: &str, path: &[&str]) -> Option<&DiffNodeReport> {
        let group = self.groups.iter().find(|g| g.name == group)?;
        let (first, rest) = path.split_first()?;
        let mut node = group.trees.iter().find(|n| n.label == *first)?;
        for label in rest {
            node = node.child(label)?;
        }
        Some(node)
    }
}

/// Metadata of one side of a comparison
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SideMetadata {
    /// Traces merged into this side
    pub traces: Vec<String>,

    /// Window the trees were built over
    pub window: Option<TimeRange>,

    /// Sum of root weights under the selected metric
    pub total_weight: u64,

    /// Call intervals folded into the trees
    pub intervals: u64,

    /// Intervals skipped as malformed
    pub malformed: u64,
}

/// Differential trees of one compared element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Display name of the comparison element
    pub name: String,

    pub baseline_element: String,

    pub comparison_element: String,

    /// Sum of root weights on the comparison side
    pub total_weight: u64,

    pub trees: Vec<DiffNodeReport>,
}

/// One serialised differential node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffNodeReport {
    /// Resolved call-site label
    pub label: String,

    /// Weight on the comparison side
    pub weight: u64,

    /// Signed ratio against the baseline
    ///
    /// `None` when the baseline has no counterpart or a zero weight; see
    /// `change` for which one
    pub difference: Option<f64>,

    pub change: ChangeKind,

    /// Difference normalised into [-1, 1]
    pub intensity: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DiffNodeReport>,
}

impl DiffNodeReport {
    pub fn child(&self, label: &str) -> Option<&DiffNodeReport> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Visit this node and its descendants, with the label path leading to each
    pub fn walk(&self, visit: &mut dyn FnMut(&[&str], &DiffNodeReport)) {
        let mut path = Vec::new();
        self.walk_with(&mut path, visit);
    }

    fn walk_with<'a>(
        &'a self,
        path: &mut Vec<&'a str>,
        visit: &mut dyn FnMut(&[&str], &DiffNodeReport),
    ) {
        path.push(&self.label);
        visit(path, self);
        for child in &self.children {
            child.walk_with(path, visit);
        }
        path.pop();
    }
}

/// A single threshold violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThresholdViolation {
    /// Name of the threshold that was violated
    pub metric: String,

    /// Label path of the offending node, `;`-separated
    pub path: String,

    /// Threshold value
    pub threshold: f64,

    /// Actual value, `None` for a node that did not exist in the baseline
    pub actual: Option<f64>,

    /// Severity: "error" or "warning"
    pub severity: String,
}

/// Summary of diff results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Whether there are any regressions
    pub has_regressions: bool,

    /// Number of threshold violations
    pub violation_count: usize,

    /// Overall status: "PASSED", "FAILED", "WARNING"
    pub status: String,

    /// Differential nodes in the report
    pub nodes: usize,

    pub new_nodes: usize,
    pub faster_nodes: usize,
    pub slower_nodes: usize,
    pub unchanged_nodes: usize,

    /// Optional warning message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl DiffSummary {
    pub fn passed() -> Self {
        Self {
            has_regressions: false,
            violation_count: 0,
            status: "PASSED".to_string(),
            nodes: 0,
            new_nodes: 0,
            faster_nodes: 0,
            slower_nodes: 0,
            unchanged_nodes: 0,
            warning: None,
        }
    }

    pub(crate) fn count(&mut self, change: ChangeKind) {
        self.nodes += 1;
        match change {
            ChangeKind::New => self.new_nodes += 1,
            ChangeKind::Unchanged => self.unchanged_nodes += 1,
            ChangeKind::Faster => self.faster_nodes += 1,
            ChangeKind::Slower | ChangeKind::FromZero => self.slower_nodes += 1,
        }
    }
}
