//! Fold call-stack intervals into aggregated calling-context trees.
//!
//! Intervals of one element arrive ordered by start time. The builder keeps
//! one open frame per stack depth; an interval at depth `d` closes every
//! frame at depth `d` or deeper and opens a new one under the frame at
//! depth `d - 1`.

use log::{debug, info, warn};
use std::fmt;
use std::thread;
use thiserror::Error;

use super::merger::absorb;
use super::node::{CallGraph, NodeId};
use crate::callsite::CallSite;
use crate::source::{
    leaf_elements, CallInterval, Element, ElementKey, IntervalSource, StatusInterval, TimeRange,
};
use crate::utils::cancel::CancellationToken;

/// Errors raised while building a call graph from a source
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Build cancelled after {completed} of {total} elements")]
    Cancelled { completed: usize, total: usize },

    #[error("Build worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Why an interval was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// `end < start`
    Inverted,
    /// Deeper than the open stack allows
    DepthGap,
    /// A sibling at the same depth is still running
    Overlap,
    /// The parent frame does not contain the interval
    OutsideParent,
    /// A status slice that no open frame contains
    Unattached,
    /// Covers the whole clock, its length does not fit in a `u64`
    Unbounded,
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Malformed::Inverted => "end before start",
            Malformed::DepthGap => "depth gap",
            Malformed::Overlap => "overlaps a sibling",
            Malformed::OutsideParent => "outside its parent",
            Malformed::Unattached => "not inside any open call",
            Malformed::Unbounded => "length overflows the clock",
        };
        f.write_str(reason)
    }
}

/// Counters of one build
///
/// **Public** - returned by [`TreeBuilder::finish`] and [`build_call_graph`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BuildReport {
    /// Leaf elements processed
    pub elements: usize,
    /// Call intervals folded into the tree
    pub intervals: u64,
    /// Status slices attached as extra children
    pub statuses: u64,
    /// Intervals and slices skipped
    pub malformed: u64,
}

impl BuildReport {
    pub fn absorb(&mut self, other: &BuildReport) {
        self.elements += other.elements;
        self.intervals += other.intervals;
        self.statuses += other.statuses;
        self.malformed += other.malformed;
    }
}

#[derive(Debug)]
struct Frame {
    node: NodeId,
    start: u64,
    end: u64,
    duration: u64,
    children_total: u64,
}

/// Incremental builder of one element's root set
///
/// **Public** - the graph stays mutably borrowed until [`finish`](Self::finish)
pub struct TreeBuilder<'g> {
    graph: &'g mut CallGraph,
    element: ElementKey,
    stack: Vec<Frame>,
    report: BuildReport,
}

impl<'g> TreeBuilder<'g> {
    pub fn new(graph: &'g mut CallGraph, element: ElementKey) -> Self {
        Self {
            graph,
            element,
            stack: Vec::new(),
            report: BuildReport {
                elements: 1,
                ..BuildReport::default()
            },
        }
    }

    /// Fold one call into the tree
    ///
    /// **Public** - malformed intervals are counted and skipped
    pub fn add_interval(&mut self, interval: &CallInterval) {
        if let Err(reason) = self.check(interval) {
            warn!(
                "Skipping interval {} [{}, {}] at depth {} in {}: {}",
                interval.call_site, interval.start, interval.end, interval.depth, self.element, reason
            );
            self.report.malformed += 1;
            return;
        }

        let depth = interval.depth as usize;
        self.close_to(depth);

        let duration = interval.duration();
        let parent = self.stack.last().map(|frame| frame.node);
        let node = match parent {
            Some(parent) => self.graph.child_or_insert(parent, &interval.call_site),
            None => self.graph.root_or_insert(&self.element, &interval.call_site),
        };
        self.graph.record_call(node, parent, duration);
        if let Some(frame) = self.stack.last_mut() {
            frame.children_total += duration;
        }

        self.stack.push(Frame {
            node,
            start: interval.start,
            end: interval.end,
            duration,
            children_total: 0,
        });
        self.report.intervals += 1;
    }

    /// Attach a kernel status slice to the deepest open call containing it
    pub fn add_status_interval(&mut self, status: &StatusInterval) {
        let target = if status.end < status.start {
            Err(Malformed::Inverted)
        } else if inclusive_length(status.start, status.end).is_none() {
            Err(Malformed::Unbounded)
        } else {
            self.stack
                .iter()
                .rev()
                .find(|frame| frame.start <= status.start && status.end <= frame.end)
                .map(|frame| frame.node)
                .ok_or(Malformed::Unattached)
        };

        match target {
            Ok(node) => {
                let call_site = CallSite::KernelStatus(status.status);
                let length = inclusive_length(status.start, status.end).unwrap_or(u64::MAX);
                self.graph.record_extra(node, &call_site, length);
                self.report.statuses += 1;
            }
            Err(reason) => {
                warn!(
                    "Skipping status {} [{}, {}] in {}: {}",
                    status.status.label(),
                    status.start,
                    status.end,
                    self.element,
                    reason
                );
                self.report.malformed += 1;
            }
        }
    }

    /// Close every remaining frame
    pub fn finish(mut self) -> BuildReport {
        self.close_to(0);
        debug!(
            "Built {}: {} intervals, {} statuses, {} malformed",
            self.element, self.report.intervals, self.report.statuses, self.report.malformed
        );
        self.report
    }

    fn check(&self, interval: &CallInterval) -> Result<(), Malformed> {
        if interval.end < interval.start {
            return Err(Malformed::Inverted);
        }
        if inclusive_length(interval.start, interval.end).is_none() {
            return Err(Malformed::Unbounded);
        }
        let depth = interval.depth as usize;
        if depth > self.stack.len() {
            return Err(Malformed::DepthGap);
        }
        if let Some(sibling) = self.stack.get(depth) {
            if sibling.end >= interval.start {
                return Err(Malformed::Overlap);
            }
        }
        if depth > 0 {
            let parent = &self.stack[depth - 1];
            if interval.start < parent.start || interval.end > parent.end {
                return Err(Malformed::OutsideParent);
            }
        }
        Ok(())
    }

    /// Pop frames until `depth` remain, recording their per-call self time
    fn close_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(frame) = self.stack.pop() {
                self.graph
                    .record_self_time_sample(frame.node, frame.duration - frame.children_total);
            }
        }
    }
}

fn inclusive_length(start: u64, end: u64) -> Option<u64> {
    (end - start).checked_add(1)
}

/// Build one element's root set from its calls and status slices
///
/// **Public** - both streams must be ordered by start; on equal starts the
/// call is opened first so a slice can land inside it
pub fn build_element(
    graph: &mut CallGraph,
    element: &ElementKey,
    intervals: &[CallInterval],
    statuses: &[StatusInterval],
) -> BuildReport {
    let mut builder = TreeBuilder::new(graph, element.clone());
    let mut pending = statuses.iter().peekable();

    for interval in intervals {
        while let Some(status) = pending.next_if(|s| s.start < interval.start) {
            builder.add_status_interval(status);
        }
        builder.add_interval(interval);
    }
    for status in pending {
        builder.add_status_interval(status);
    }

    builder.finish()
}

/// Build the call graph of every leaf element of a source
///
/// **Public** - main entry point of the aggregation step
///
/// # Arguments
/// * `source` - Interval supplier
/// * `window` - Time window, intervals are clipped to it
/// * `cancel` - Checked between elements
///
/// # Returns
/// The graph (with the source's element hierarchy) and the build counters
///
/// # Errors
/// * `BuildError::Cancelled` - The token was cancelled; no partial graph is returned
/// * `BuildError::WorkerPanicked` - A worker thread panicked
pub fn build_call_graph(
    source: &dyn IntervalSource,
    window: TimeRange,
    cancel: &CancellationToken,
) -> Result<(CallGraph, BuildReport), BuildError> {
    let hierarchy = source.elements();
    let leaves: Vec<&Element> = leaf_elements(&hierarchy);
    let total = leaves.len();

    info!(
        "Building call graph of {} ({} elements, window {})",
        source.trace_name(),
        total,
        window
    );

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(total.max(1));
    let chunk_size = total.div_ceil(workers).max(1);

    let partials: Vec<Result<(CallGraph, BuildReport), BuildError>> = thread::scope(|scope| {
        let handles: Vec<_> = leaves
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || build_chunk(source, chunk, window, cancel, total)))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| Err(BuildError::WorkerPanicked(panic_message(&*panic))))
            })
            .collect()
    });

    let mut graph = CallGraph::new();
    for element in hierarchy.iter().cloned() {
        graph.add_element(element);
    }

    let mut report = BuildReport::default();
    let mut completed = 0;
    for partial in partials {
        match partial {
            Ok((part, part_report)) => {
                absorb(&mut graph, &part);
                report.absorb(&part_report);
                completed += part_report.elements;
            }
            Err(BuildError::Cancelled { .. }) => {
                return Err(BuildError::Cancelled { completed, total });
            }
            Err(err) => return Err(err),
        }
    }

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled { completed, total });
    }

    info!(
        "Built {} nodes from {} intervals ({} malformed)",
        graph.node_count(),
        report.intervals,
        report.malformed
    );

    Ok((graph, report))
}

fn build_chunk(
    source: &dyn IntervalSource,
    chunk: &[&Element],
    window: TimeRange,
    cancel: &CancellationToken,
    total: usize,
) -> Result<(CallGraph, BuildReport), BuildError> {
    let mut graph = CallGraph::new();
    let mut report = BuildReport::default();

    for element in chunk {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled {
                completed: report.elements,
                total,
            });
        }
        let intervals = source.intervals(&element.key, window);
        let statuses = source.statuses(&element.key, window);
        debug!(
            "Element {}: {} intervals, {} statuses",
            element.key,
            intervals.len(),
            statuses.len()
        );
        let element_report = build_element(&mut graph, &element.key, &intervals, &statuses);
        report.absorb(&element_report);
    }

    Ok((graph, report))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
