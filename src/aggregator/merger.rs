//! Merging of aggregated trees.
//!
//! Merging sums: durations, call counts and statistics are added and the
//! children are united by call site. Self time is re-derived afterwards so
//! the node invariants hold on the result.

use log::{debug, info};
use thiserror::Error;

use super::node::{CallGraph, NodeId};
use crate::source::{Element, ElementKey};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    #[error("Cannot merge node {src} into node {dst}: identities differ")]
    IdentityMismatch { dst: String, src: String },

    #[error("Cannot average over zero runs")]
    ZeroRuns,
}

/// Merge the subtree `src_id` of `src` into the node `dst_id` of `dst`
///
/// **Public** - the two nodes must share their identity
///
/// # Errors
/// * `MergeError::IdentityMismatch` - The nodes have different call sites
pub fn merge_nodes(
    dst: &mut CallGraph,
    dst_id: NodeId,
    src: &CallGraph,
    src_id: NodeId,
) -> Result<(), MergeError> {
    let dst_identity = dst.node(dst_id).identity();
    let src_identity = src.node(src_id).identity();
    if dst_identity != src_identity {
        return Err(MergeError::IdentityMismatch {
            dst: dst_identity.to_string(),
            src: src_identity.to_string(),
        });
    }
    merge_into(dst, dst_id, src, src_id);
    Ok(())
}

fn merge_into(dst: &mut CallGraph, dst_id: NodeId, src: &CallGraph, src_id: NodeId) {
    let source = src.node(src_id);
    dst.node_mut(dst_id).add_data(source);

    for &child in source.children() {
        let call_site = src.node(child).identity();
        match dst.node(dst_id).child(call_site) {
            Some(existing) => merge_into(dst, existing, src, child),
            None => {
                copy_subtree(dst, Placement::Child(dst_id), src, child);
            }
        }
    }
    for &extra in source.extra_children() {
        let call_site = src.node(extra).identity();
        match dst.node(dst_id).extra_child(call_site) {
            Some(existing) => merge_into(dst, existing, src, extra),
            None => {
                copy_subtree(dst, Placement::Extra(dst_id), src, extra);
            }
        }
    }

    dst.rederive_self_time(dst_id);
}

enum Placement<'a> {
    Root(&'a ElementKey),
    Child(NodeId),
    Extra(NodeId),
}

/// Deep-copy a subtree of `src` into `dst` at the given place
fn copy_subtree(dst: &mut CallGraph, place: Placement<'_>, src: &CallGraph, src_id: NodeId) -> NodeId {
    let source = src.node(src_id);
    let copy = source.detached_copy();
    let id = match place {
        Placement::Root(element) => dst.attach_root(element, copy),
        Placement::Child(parent) => dst.attach_child(parent, copy, false),
        Placement::Extra(parent) => dst.attach_child(parent, copy, true),
    };
    for &child in source.children() {
        copy_subtree(dst, Placement::Child(id), src, child);
    }
    for &extra in source.extra_children() {
        copy_subtree(dst, Placement::Extra(id), src, extra);
    }
    id
}

/// Merge the root set of one element into the root set of another
///
/// **Public** - roots are matched by call site, so the result holds one root
/// per distinct identity of both sets
pub fn merge_roots(
    dst: &mut CallGraph,
    dst_element: &ElementKey,
    src: &CallGraph,
    src_element: &ElementKey,
) {
    for &root in src.roots(src_element) {
        let call_site = src.node(root).identity();
        match dst.root(dst_element, call_site) {
            Some(existing) => merge_into(dst, existing, src, root),
            None => {
                copy_subtree(dst, Placement::Root(dst_element), src, root);
            }
        }
    }
}

/// Copy every element and root set of `src` into `dst`
///
/// **Public** - root sets of elements present on both sides are merged
pub fn absorb(dst: &mut CallGraph, src: &CallGraph) {
    for element in src.elements() {
        dst.add_element(element.clone());
    }
    for key in src.root_keys() {
        merge_roots(dst, &key, src, &key);
    }
}

/// Fold every root set of every graph into a single group element
///
/// **Public** - used to compare whole traces rather than single threads
///
/// # Arguments
/// * `graphs` - Graphs to merge, left untouched
/// * `group` - Element that receives the merged roots
///
/// # Returns
/// A new graph whose only element is `group`
pub fn merge_graphs(graphs: &[&CallGraph], group: Element) -> CallGraph {
    info!("Merging {} call graphs into {}", graphs.len(), group.key);

    let mut merged = CallGraph::new();
    let key = group.key.clone();
    merged.add_element(group);

    for graph in graphs {
        for element in graph.root_keys() {
            debug!(
                "Merging {} roots of {}",
                graph.roots(&element).len(),
                element
            );
            merge_roots(&mut merged, &key, graph, &element);
        }
    }

    merged
}

/// Turn a merged sum over `runs` traces into a per-run average
///
/// **Public** - never applied by the merge functions themselves
///
/// Weights are divided once by the total number of runs. Halving after each
/// pairwise merge instead gives the last run twice the weight of the first
/// as soon as more than two runs are merged.
///
/// # Errors
/// * `MergeError::ZeroRuns` - `runs` is 0
pub fn average(graph: &mut CallGraph, runs: u64) -> Result<(), MergeError> {
    if runs == 0 {
        return Err(MergeError::ZeroRuns);
    }
    if runs == 1 {
        return Ok(());
    }

    let ids: Vec<NodeId> = graph.node_ids().collect();
    for &id in &ids {
        graph.node_mut(id).scale_down(runs);
    }
    for &id in &ids {
        graph.rederive_self_time(id);
    }
    Ok(())
}
