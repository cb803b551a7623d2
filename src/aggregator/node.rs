//! Aggregated nodes and the call graph arena that owns them.
//!
//! Nodes live in a flat arena and refer to their children through
//! [`NodeId`] handles. A node never points back to its parent: every
//! traversal in this crate is top-down.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::callsite::CallSite;
use crate::source::{Element, ElementKey};

/// Handle of a node inside one [`CallGraph`]
///
/// A handle is only meaningful for the graph that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Insertion-ordered set of child handles keyed by call site
#[derive(Debug, Clone, Default)]
pub struct ChildSet {
    order: Vec<NodeId>,
    index: HashMap<CallSite, NodeId>,
}

impl ChildSet {
    pub fn get(&self, call_site: &CallSite) -> Option<NodeId> {
        self.index.get(call_site).copied()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, call_site: CallSite, id: NodeId) {
        self.index.insert(call_site, id);
        self.order.push(id);
    }
}

/// Per-invocation statistics of one value (duration or self time)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatistics {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
}

impl CallStatistics {
    /// Record one invocation
    pub fn update(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total += value;
    }

    /// Fold another set of statistics into this one
    pub fn merge(&mut self, other: &CallStatistics) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count += other.count;
        self.total += other.total;
    }

    /// Divide the totals by `runs`; min and max stay per invocation
    pub(crate) fn scale_down(&mut self, runs: u64) {
        if self.count == 0 {
            return;
        }
        self.count = (self.count / runs).max(1);
        self.total /= runs;
    }

    /// Mean value per invocation, 0 when nothing was recorded
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

/// One call site merged across all of its invocations at a tree position
#[derive(Debug, Clone)]
pub struct AggregatedNode {
    identity: CallSite,
    duration: u64,
    self_time: u64,
    call_count: u64,
    duration_stats: CallStatistics,
    self_time_stats: CallStatistics,
    children: ChildSet,
    extra_children: ChildSet,
}

impl AggregatedNode {
    fn new(identity: CallSite) -> Self {
        Self {
            identity,
            duration: 0,
            self_time: 0,
            call_count: 0,
            duration_stats: CallStatistics::default(),
            self_time_stats: CallStatistics::default(),
            children: ChildSet::default(),
            extra_children: ChildSet::default(),
        }
    }

    /// Same data, no children
    pub(crate) fn detached_copy(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            duration: self.duration,
            self_time: self.self_time,
            call_count: self.call_count,
            duration_stats: self.duration_stats,
            self_time_stats: self.self_time_stats,
            children: ChildSet::default(),
            extra_children: ChildSet::default(),
        }
    }

    pub fn identity(&self) -> &CallSite {
        &self.identity
    }

    /// Total time of all merged invocations, children included
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Duration not spent in direct children
    pub fn self_time(&self) -> u64 {
        self.self_time
    }

    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    pub fn duration_statistics(&self) -> &CallStatistics {
        &self.duration_stats
    }

    pub fn self_time_statistics(&self) -> &CallStatistics {
        &self.self_time_stats
    }

    pub fn children(&self) -> &[NodeId] {
        self.children.ids()
    }

    /// Kernel status slices recorded while this call site was on the stack
    pub fn extra_children(&self) -> &[NodeId] {
        self.extra_children.ids()
    }

    pub fn child(&self, call_site: &CallSite) -> Option<NodeId> {
        self.children.get(call_site)
    }

    pub fn extra_child(&self, call_site: &CallSite) -> Option<NodeId> {
        self.extra_children.get(call_site)
    }

    /// Add the weights of another node, children untouched
    pub(crate) fn add_data(&mut self, other: &AggregatedNode) {
        self.duration += other.duration;
        self.call_count += other.call_count;
        self.duration_stats.merge(&other.duration_stats);
        self.self_time_stats.merge(&other.self_time_stats);
    }

    /// Divide weights by `runs`, keeping at least one call
    pub(crate) fn scale_down(&mut self, runs: u64) {
        self.duration /= runs;
        self.call_count = (self.call_count / runs).max(1);
        self.duration_stats.scale_down(runs);
        self.self_time_stats.scale_down(runs);
    }
}

/// Arena of aggregated nodes plus the element hierarchy and root sets
///
/// **Public** - the tree set produced by building or merging
///
/// Each element (usually a thread) owns a root set: its root-level call
/// sites keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: Vec<AggregatedNode>,
    elements: Vec<Element>,
    roots: HashMap<ElementKey, ChildSet>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access a node, panics on a handle from another graph
    pub fn node(&self, id: NodeId) -> &AggregatedNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&AggregatedNode> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root elements of the hierarchy
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn find_element(&self, key: &ElementKey) -> Option<&Element> {
        self.elements.iter().find_map(|e| e.find(key))
    }

    /// Register a root element; an element with the same key is extended
    pub fn add_element(&mut self, element: Element) {
        match self.elements.iter_mut().find(|e| e.key == element.key) {
            Some(existing) => existing.merge_children(&element),
            None => self.elements.push(element),
        }
    }

    /// Root call sites of an element, empty when it has none
    pub fn roots(&self, element: &ElementKey) -> &[NodeId] {
        self.roots.get(element).map(ChildSet::ids).unwrap_or(&[])
    }

    pub fn root(&self, element: &ElementKey, call_site: &CallSite) -> Option<NodeId> {
        self.roots.get(element).and_then(|r| r.get(call_site))
    }

    /// Elements that own at least one root, sorted
    pub fn elements_with_roots(&self) -> Vec<&ElementKey> {
        let mut keys: Vec<&ElementKey> = self
            .roots
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        keys
    }

    /// Sum of root durations of an element
    pub fn total_duration(&self, element: &ElementKey) -> u64 {
        self.roots(element)
            .iter()
            .map(|id| self.node(*id).duration)
            .sum()
    }

    /// Depth of the subtree rooted at `id`, 1 for a leaf
    pub fn max_depth(&self, id: NodeId) -> u32 {
        let deepest = self
            .node(id)
            .children()
            .iter()
            .map(|child| self.max_depth(*child))
            .max()
            .unwrap_or(0);
        deepest + 1
    }

    /// Find a node by following call-site labels from an element's roots
    pub fn find_path(&self, element: &ElementKey, path: &[CallSite]) -> Option<NodeId> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root(element, first)?;
        for call_site in rest {
            current = self.node(current).child(call_site)?;
        }
        Some(current)
    }

    /// Check the aggregation invariants of every node
    ///
    /// # Panics
    /// When a node has no call, or its duration is not its self time plus
    /// its children's durations. Either means the aggregation is broken.
    pub fn assert_invariants(&self) {
        for (index, node) in self.nodes.iter().enumerate() {
            assert!(
                node.call_count >= 1,
                "node {} ({}) exists without any call",
                index,
                node.identity
            );
            let children: u64 = node.children().iter().map(|c| self.node(*c).duration).sum();
            assert_eq!(
                node.duration,
                node.self_time + children,
                "node {} ({}) breaks duration = self time + children",
                index,
                node.identity
            );
        }
    }

    // ------------------------------------------------------------------
    // Mutation, reserved to the builder and the merger
    // ------------------------------------------------------------------

    fn alloc(&mut self, node: AggregatedNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut AggregatedNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn root_or_insert(&mut self, element: &ElementKey, call_site: &CallSite) -> NodeId {
        if let Some(id) = self.root(element, call_site) {
            return id;
        }
        let id = self.alloc(AggregatedNode::new(call_site.clone()));
        self.roots
            .entry(element.clone())
            .or_default()
            .insert(call_site.clone(), id);
        id
    }

    pub(crate) fn child_or_insert(&mut self, parent: NodeId, call_site: &CallSite) -> NodeId {
        if let Some(id) = self.node(parent).child(call_site) {
            return id;
        }
        let id = self.alloc(AggregatedNode::new(call_site.clone()));
        self.node_mut(parent).children.insert(call_site.clone(), id);
        id
    }

    pub(crate) fn extra_or_insert(&mut self, parent: NodeId, call_site: &CallSite) -> NodeId {
        if let Some(id) = self.node(parent).extra_child(call_site) {
            return id;
        }
        let id = self.alloc(AggregatedNode::new(call_site.clone()));
        self.node_mut(parent)
            .extra_children
            .insert(call_site.clone(), id);
        id
    }

    /// Insert a detached copy as a new root of an element
    pub(crate) fn attach_root(&mut self, element: &ElementKey, node: AggregatedNode) -> NodeId {
        let call_site = node.identity.clone();
        let id = self.alloc(node);
        self.roots
            .entry(element.clone())
            .or_default()
            .insert(call_site, id);
        id
    }

    /// Insert a detached copy as a new child (or extra child) of `parent`
    pub(crate) fn attach_child(&mut self, parent: NodeId, node: AggregatedNode, extra: bool) -> NodeId {
        let call_site = node.identity.clone();
        let id = self.alloc(node);
        let parent = self.node_mut(parent);
        if extra {
            parent.extra_children.insert(call_site, id);
        } else {
            parent.children.insert(call_site, id);
        }
        id
    }

    /// Account one invocation of `id`, nested directly in `parent`
    pub(crate) fn record_call(&mut self, id: NodeId, parent: Option<NodeId>, duration: u64) {
        let node = self.node_mut(id);
        node.duration += duration;
        node.self_time += duration;
        node.call_count += 1;
        node.duration_stats.update(duration);

        if let Some(parent) = parent {
            let parent = self.node_mut(parent);
            assert!(
                parent.self_time >= duration,
                "child call of {} longer than the remaining self time of {}",
                duration,
                parent.identity
            );
            parent.self_time -= duration;
        }
    }

    /// Record the self time of one finished invocation
    pub(crate) fn record_self_time_sample(&mut self, id: NodeId, self_time: u64) {
        self.node_mut(id).self_time_stats.update(self_time);
    }

    /// Account one kernel status slice under `parent`
    pub(crate) fn record_extra(&mut self, parent: NodeId, call_site: &CallSite, duration: u64) {
        let id = self.extra_or_insert(parent, call_site);
        let node = self.node_mut(id);
        node.duration += duration;
        node.self_time += duration;
        node.call_count += 1;
        node.duration_stats.update(duration);
        node.self_time_stats.update(duration);
    }

    /// Recompute a node's self time from its duration and children
    pub(crate) fn rederive_self_time(&mut self, id: NodeId) {
        let children: u64 = self
            .node(id)
            .children()
            .iter()
            .map(|c| self.node(*c).duration)
            .sum();
        let node = self.node_mut(id);
        assert!(
            node.duration >= children,
            "children of {} last longer than the node itself",
            node.identity
        );
        node.self_time = node.duration - children;
    }

    pub(crate) fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub(crate) fn root_keys(&self) -> Vec<ElementKey> {
        self.elements_with_roots().into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> ElementKey {
        ElementKey::new("t", &["p", "1"])
    }

    #[test]
    fn test_statistics_update_and_merge() {
        let mut first = CallStatistics::default();
        first.update(10);
        first.update(30);
        let mut second = CallStatistics::default();
        second.update(5);
        first.merge(&second);
        assert_eq!(first.count, 3);
        assert_eq!(first.total, 45);
        assert_eq!(first.min, 5);
        assert_eq!(first.max, 30);
        assert_eq!(first.mean(), 15.0);
    }

    #[test]
    fn test_statistics_merge_into_empty() {
        let mut empty = CallStatistics::default();
        let mut other = CallStatistics::default();
        other.update(7);
        empty.merge(&other);
        assert_eq!(empty, other);
    }

    #[test]
    fn test_record_call_maintains_self_time() {
        let mut graph = CallGraph::new();
        let root = graph.root_or_insert(&thread(), &CallSite::function("main"));
        graph.record_call(root, None, 100);
        let child = graph.child_or_insert(root, &CallSite::function("work"));
        graph.record_call(child, Some(root), 60);

        assert_eq!(graph.node(root).duration(), 100);
        assert_eq!(graph.node(root).self_time(), 40);
        assert_eq!(graph.node(child).self_time(), 60);
        assert_eq!(graph.max_depth(root), 2);
        graph.assert_invariants();
    }

    #[test]
    fn test_child_lookup_reuses_node() {
        let mut graph = CallGraph::new();
        let root = graph.root_or_insert(&thread(), &CallSite::function("main"));
        let a = graph.child_or_insert(root, &CallSite::function("work"));
        let b = graph.child_or_insert(root, &CallSite::function("work"));
        assert_eq!(a, b);
        assert_eq!(graph.node(root).children().len(), 1);
    }

    #[test]
    fn test_extra_children_stay_out_of_self_time() {
        let mut graph = CallGraph::new();
        let root = graph.root_or_insert(&thread(), &CallSite::function("main"));
        graph.record_call(root, None, 100);
        let status = CallSite::KernelStatus(crate::callsite::ProcessStatus::WaitBlocked);
        graph.record_extra(root, &status, 30);
        graph.record_extra(root, &status, 10);

        let node = graph.node(root);
        assert_eq!(node.self_time(), 100);
        assert_eq!(node.extra_children().len(), 1);
        let extra = graph.node(node.extra_children()[0]);
        assert_eq!(extra.duration(), 40);
        assert_eq!(extra.call_count(), 2);
        graph.assert_invariants();
    }

    #[test]
    #[should_panic(expected = "remaining self time")]
    fn test_oversized_child_panics() {
        let mut graph = CallGraph::new();
        let root = graph.root_or_insert(&thread(), &CallSite::function("main"));
        graph.record_call(root, None, 10);
        let child = graph.child_or_insert(root, &CallSite::function("work"));
        graph.record_call(child, Some(root), 20);
    }

    #[test]
    fn test_find_path() {
        let mut graph = CallGraph::new();
        let root = graph.root_or_insert(&thread(), &CallSite::function("main"));
        graph.record_call(root, None, 10);
        let child = graph.child_or_insert(root, &CallSite::function("work"));
        graph.record_call(child, Some(root), 5);

        let path = [CallSite::function("main"), CallSite::function("work")];
        assert_eq!(graph.find_path(&thread(), &path), Some(child));
        assert_eq!(graph.find_path(&thread(), &[CallSite::function("work")]), None);
    }
}
