//! Differential call graphs and threshold checking.
//!
//! This module pairs the elements of two call graphs (baseline vs target),
//! walks their trees in lock-step and produces differential trees, reports
//! and threshold violations.
//!
//! # Example
//! ```ignore
//! use callgraph_studio::diff::{diff_call_graphs, generate_report, Metric};
//!
//! let forest = diff_call_graphs(&baseline, &target, Metric::Duration, &cancel)?;
//! let mut report = generate_report(&forest, base_meta, target_meta, &resolver, &thresholds);
//! check_thresholds(&mut report, &thresholds);
//! ```

mod engine;
mod normalizer;
pub mod output;
mod pairing;
mod schema;
mod threshold;

// Public API exports
pub use engine::{
    diff_call_graphs, diff_call_graphs_with_progress, diff_elements, diff_trees, generate_report,
    DiffForest, DiffGroup, DiffNode,
};
pub use normalizer::{as_percent, relative_difference, Metric};
pub use pairing::{pair_elements, ElementPair, Pairing, PairingRule};
pub use schema::{
    DiffNodeReport, DiffReport, DiffSummary, GroupReport, SideMetadata, ThresholdViolation,
};
pub use threshold::{check_thresholds, classify, intensity, load_thresholds, ChangeKind, ThresholdConfig};

// Error type
use thiserror::Error;

use crate::aggregator::{BuildError, MergeError};

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("No comparable elements between baseline and target")]
    NoComparableElements,

    #[error("Diff cancelled after {completed} element pairs")]
    Cancelled { completed: usize },

    #[error("Unknown metric '{0}' (expected Duration or SelfTime)")]
    UnknownMetric(String),

    #[error("Failed to build call graph: {0}")]
    Build(#[from] BuildError),

    #[error("Failed to merge call graphs: {0}")]
    Merge(#[from] MergeError),

    #[error("No traces given for the {0} side")]
    NoTraces(&'static str),

    #[error("Invalid threshold configuration: {0}")]
    InvalidThresholds(String),

    #[error("Threshold TOML parse error: {0}")]
    ThresholdParseFailed(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
