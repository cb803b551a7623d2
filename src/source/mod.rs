//! Boundary with the interval storage backend.
//!
//! The core never reads traces itself. It asks an [`IntervalSource`] for the
//! element hierarchy (process, thread, ...) and, per leaf element, for the
//! ordered call-stack intervals that fall in a time window.

pub mod dump;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::callsite::{CallSite, ProcessStatus, SymbolTable};

pub use dump::{load_dump, parse_dump, InMemorySource, IntervalDump};

/// Closed time range `[start, end]`, in trace time units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    pub const ETERNITY: TimeRange = TimeRange {
        start: 0,
        end: u64::MAX,
    };

    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn eternity() -> Self {
        Self::ETERNITY
    }

    pub fn contains(&self, time: u64) -> bool {
        self.start <= time && time <= self.end
    }

    /// Overlap of two ranges, `None` when they are disjoint
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeRange { start, end })
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::ETERNITY
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One call, as seen on the physical call stack of an element
///
/// Both bounds are inclusive, so a call covering `[0, 99]` lasts 100 units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInterval {
    /// Stack depth, 0 for root calls
    pub depth: u32,
    pub call_site: CallSite,
    pub start: u64,
    pub end: u64,
}

impl CallInterval {
    pub fn new(depth: u32, call_site: impl Into<CallSite>, start: u64, end: u64) -> Self {
        Self {
            depth,
            call_site: call_site.into(),
            start,
            end,
        }
    }

    /// Inclusive length of the call, 0 for inverted intervals
    ///
    /// Saturates at `u64::MAX` for a call spanning the whole clock.
    pub fn duration(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start).saturating_add(1)
        }
    }

    /// Restrict the interval to a window, `None` when it falls outside
    pub fn clipped(&self, window: &TimeRange) -> Option<CallInterval> {
        if self.end < self.start {
            // Inverted intervals are passed through so the builder can count them
            return window.contains(self.start).then(|| self.clone());
        }
        let range = TimeRange::new(self.start, self.end).intersect(window)?;
        Some(CallInterval {
            depth: self.depth,
            call_site: self.call_site.clone(),
            start: range.start,
            end: range.end,
        })
    }
}

/// Scheduling status of an element over a closed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInterval {
    pub status: ProcessStatus,
    pub start: u64,
    pub end: u64,
}

impl StatusInterval {
    pub fn new(status: ProcessStatus, start: u64, end: u64) -> Self {
        Self { status, start, end }
    }

    pub fn clipped(&self, window: &TimeRange) -> Option<StatusInterval> {
        let range = TimeRange::new(self.start, self.end).intersect(window)?;
        Some(StatusInterval {
            status: self.status,
            start: range.start,
            end: range.end,
        })
    }
}

/// Value identity of an element: the trace it belongs to and its path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey {
    pub trace: String,
    pub path: Vec<String>,
}

impl ElementKey {
    pub fn new(trace: impl Into<String>, path: &[&str]) -> Self {
        Self {
            trace: trace.into(),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Key of a direct child of this element
    pub fn child(&self, name: &str) -> ElementKey {
        let mut path = self.path.clone();
        path.push(name.to_string());
        ElementKey {
            trace: self.trace.clone(),
            path,
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.trace, self.path.join("/"))
    }
}

/// A grouping unit (trace, process, thread) whose calls feed one tree set
///
/// **Public** - equality and hashing use the key only, the display name is
/// used by the name pairing rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub key: ElementKey,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(key: ElementKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }

    /// An element that groups other elements
    pub fn is_compound(&self) -> bool {
        !self.children.is_empty()
    }

    /// All leaf elements under (and including) this one, depth first
    pub fn leaves(&self) -> Vec<&Element> {
        if !self.is_compound() {
            return vec![self];
        }
        self.children.iter().flat_map(Element::leaves).collect()
    }

    /// Find an element by key in this subtree
    pub fn find(&self, key: &ElementKey) -> Option<&Element> {
        if &self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    /// Merge another element's children into this one, by key
    pub(crate) fn merge_children(&mut self, other: &Element) {
        for child in &other.children {
            match self.children.iter_mut().find(|c| c.key == child.key) {
                Some(existing) => existing.merge_children(child),
                None => self.children.push(child.clone()),
            }
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Supplier of call-stack intervals
///
/// **Public** - implemented by storage backends; [`InMemorySource`] is the
/// bundled implementation
pub trait IntervalSource: Sync {
    /// Name of the trace the data comes from
    fn trace_name(&self) -> &str;

    /// Root elements of the hierarchy
    fn elements(&self) -> Vec<Element>;

    /// Time span covered by the trace
    fn time_bounds(&self) -> TimeRange;

    /// Call intervals of a leaf element overlapping `window`, clipped to it
    /// and ordered by start time (parents before children on ties)
    fn intervals(&self, element: &ElementKey, window: TimeRange) -> Vec<CallInterval>;

    /// Kernel status slices of a leaf element overlapping `window`
    fn statuses(&self, _element: &ElementKey, _window: TimeRange) -> Vec<StatusInterval> {
        Vec::new()
    }

    /// Symbols for address call sites of this trace
    fn symbols(&self) -> SymbolTable {
        SymbolTable::new()
    }
}

/// Collect the leaf elements of a hierarchy, depth first
pub fn leaf_elements(roots: &[Element]) -> Vec<&Element> {
    roots.iter().flat_map(Element::leaves).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_duration_is_inclusive() {
        assert_eq!(CallInterval::new(0, "main", 0, 99).duration(), 100);
        assert_eq!(CallInterval::new(0, "main", 5, 5).duration(), 1);
        assert_eq!(CallInterval::new(0, "main", 9, 5).duration(), 0);
        assert_eq!(CallInterval::new(0, "main", 0, u64::MAX).duration(), u64::MAX);
    }

    #[test]
    fn test_interval_clipping() {
        let window = TimeRange::new(10, 20);
        let clipped = CallInterval::new(0, "main", 0, 15).clipped(&window).unwrap();
        assert_eq!((clipped.start, clipped.end), (10, 15));
        assert!(CallInterval::new(0, "main", 21, 30).clipped(&window).is_none());
    }

    #[test]
    fn test_element_equality_ignores_name() {
        let a = Element::new(ElementKey::new("t", &["p", "1"]), "worker");
        let b = Element::new(ElementKey::new("t", &["p", "1"]), "renamed");
        let c = Element::new(ElementKey::new("u", &["p", "1"]), "worker");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_leaves_of_hierarchy() {
        let process = ElementKey::new("t", &["p"]);
        let root = Element::new(process.clone(), "p").with_children(vec![
            Element::new(process.child("1"), "1"),
            Element::new(process.child("2"), "2"),
        ]);
        let leaves: Vec<_> = root.leaves().iter().map(|e| e.name.clone()).collect();
        assert_eq!(leaves, vec!["1", "2"]);
        assert!(root.find(&process.child("2")).is_some());
    }
}
