//! Order-independent, serialisable view of a call graph.
//!
//! Children are sorted by label, so two graphs holding the same aggregated
//! data compare equal whatever order their nodes were created in.

use serde::{Deserialize, Serialize};

use super::node::{CallGraph, CallStatistics, NodeId};
use crate::callsite::SymbolResolver;
use crate::source::ElementKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub label: String,
    pub duration: u64,
    pub self_time: u64,
    pub call_count: u64,
    pub max_depth: u32,
    pub duration_stats: CallStatistics,
    pub self_time_stats: CallStatistics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Capture the subtree rooted at `id`
    ///
    /// Depths are taken from the captured children, extra children excluded.
    pub fn capture(graph: &CallGraph, id: NodeId, resolver: &dyn SymbolResolver) -> Self {
        let node = graph.node(id);
        let children = capture_sorted(graph, node.children(), resolver);
        let max_depth = children.iter().map(|c| c.max_depth).max().unwrap_or(0) + 1;
        Self {
            label: node.identity().resolve_label(resolver),
            duration: node.duration(),
            self_time: node.self_time(),
            call_count: node.call_count(),
            max_depth,
            duration_stats: *node.duration_statistics(),
            self_time_stats: *node.self_time_statistics(),
            children,
            extra: capture_sorted(graph, node.extra_children(), resolver),
        }
    }

    /// Find a direct child by label
    pub fn child(&self, label: &str) -> Option<&NodeSnapshot> {
        self.children.iter().find(|c| c.label == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub element: String,
    pub name: String,
    pub total_duration: u64,
    pub roots: Vec<NodeSnapshot>,
}

/// Snapshot of every element root set of a graph
///
/// **Public** - written by the `build` command, compared in tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub elements: Vec<ElementSnapshot>,
}

impl GraphSnapshot {
    pub fn capture(graph: &CallGraph, resolver: &dyn SymbolResolver) -> Self {
        let elements = graph
            .elements_with_roots()
            .into_iter()
            .map(|key| ElementSnapshot {
                element: key.to_string(),
                name: element_name(graph, key),
                total_duration: graph.total_duration(key),
                roots: capture_sorted(graph, graph.roots(key), resolver),
            })
            .collect();
        Self { elements }
    }

    /// Root snapshots of the element displayed as `element`
    pub fn roots(&self, element: &str) -> Option<&[NodeSnapshot]> {
        self.elements
            .iter()
            .find(|e| e.element == element)
            .map(|e| e.roots.as_slice())
    }
}

fn element_name(graph: &CallGraph, key: &ElementKey) -> String {
    graph
        .find_element(key)
        .map(|e| e.name.clone())
        .or_else(|| key.path.last().cloned())
        .unwrap_or_default()
}

fn capture_sorted(
    graph: &CallGraph,
    ids: &[NodeId],
    resolver: &dyn SymbolResolver,
) -> Vec<NodeSnapshot> {
    let mut snapshots: Vec<NodeSnapshot> = ids
        .iter()
        .map(|id| NodeSnapshot::capture(graph, *id, resolver))
        .collect();
    snapshots.sort_by(|a, b| a.label.cmp(&b.label).then(b.duration.cmp(&a.duration)));
    snapshots
}
