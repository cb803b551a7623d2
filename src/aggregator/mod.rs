//! Aggregation of call-stack intervals into calling-context trees.
//!
//! This module turns interval streams into:
//! - Aggregated trees, one root set per element (`tree_builder`)
//! - Merged trees across elements and traces (`merger`)
//! - Sorted snapshots for output and comparison (`snapshot`)

pub mod merger;
pub mod node;
pub mod snapshot;
pub mod tree_builder;

// Re-export main types and functions
pub use merger::{absorb, average, merge_graphs, merge_nodes, merge_roots, MergeError};
pub use node::{AggregatedNode, CallGraph, CallStatistics, ChildSet, NodeId};
pub use snapshot::{ElementSnapshot, GraphSnapshot, NodeSnapshot};
pub use tree_builder::{
    build_call_graph, build_element, BuildError, BuildReport, Malformed, TreeBuilder,
};
