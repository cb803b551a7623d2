//! JSON interval dumps and the in-memory interval source.
//!
//! A dump is what an interval backend would hand over for one trace:
//!
//! ```json
//! {
//!   "trace": "run-a",
//!   "symbols": { "0x1000": "main" },
//!   "elements": [
//!     { "name": "server", "children": [
//!       { "name": "worker-1",
//!         "intervals": [ { "depth": 0, "symbol": "main", "start": 0, "end": 99 } ],
//!         "statuses": [ { "status": "running", "start": 0, "end": 49 } ] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A string `symbol` is a resolved function name, an integer is an address.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::{CallInterval, Element, ElementKey, IntervalSource, StatusInterval, TimeRange};
use crate::callsite::{CallSite, ProcessStatus, SymbolTable};
use crate::utils::error::SourceError;

/// Top-level interval dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalDump {
    /// Trace name, also the first component of every element key
    pub trace: String,

    /// Address (decimal or `0x` hex) to symbol name
    #[serde(default)]
    pub symbols: BTreeMap<String, String>,

    /// Root elements
    pub elements: Vec<DumpElement>,
}

/// One element of the dump hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpElement {
    pub name: String,

    #[serde(default)]
    pub children: Vec<DumpElement>,

    #[serde(default)]
    pub intervals: Vec<DumpInterval>,

    #[serde(default)]
    pub statuses: Vec<DumpStatus>,
}

/// One call of the dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpInterval {
    pub depth: u32,
    pub symbol: DumpSymbol,
    pub start: u64,
    pub end: u64,
}

/// Symbol reference, either an address or a name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DumpSymbol {
    Address(u64),
    Name(String),
}

/// One status slice of the dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpStatus {
    pub status: ProcessStatus,
    pub start: u64,
    pub end: u64,
}

/// Interval source backed by memory
///
/// **Public** - loaded from dumps, or filled by hand in tests
#[derive(Debug, Clone)]
pub struct InMemorySource {
    trace: String,
    symbols: SymbolTable,
    elements: Vec<Element>,
    calls: HashMap<ElementKey, Vec<CallInterval>>,
    statuses: HashMap<ElementKey, Vec<StatusInterval>>,
}

impl InMemorySource {
    /// Create an empty source for a trace
    pub fn new(trace: impl Into<String>) -> Self {
        Self {
            trace: trace.into(),
            symbols: SymbolTable::new(),
            elements: Vec::new(),
            calls: HashMap::new(),
            statuses: HashMap::new(),
        }
    }

    /// Register an element by path, creating the intermediate groups
    ///
    /// # Returns
    /// The key of the deepest element
    pub fn add_element(&mut self, path: &[&str]) -> ElementKey {
        let mut key = ElementKey::new(self.trace.clone(), &[]);
        let mut level = &mut self.elements;
        for name in path {
            key = key.child(name);
            let position = match level.iter().position(|e| e.key == key) {
                Some(position) => position,
                None => {
                    level.push(Element::new(key.clone(), *name));
                    level.len() - 1
                }
            };
            level = &mut level[position].children;
        }
        key
    }

    /// Add a call to an element, keeping the per-element order
    pub fn add_interval(&mut self, element: &ElementKey, interval: CallInterval) {
        let calls = self.calls.entry(element.clone()).or_default();
        calls.push(interval);
        calls.sort_by_key(|c| (c.start, c.depth));
    }

    pub fn add_status(&mut self, element: &ElementKey, status: StatusInterval) {
        let statuses = self.statuses.entry(element.clone()).or_default();
        statuses.push(status);
        statuses.sort_by_key(|s| s.start);
    }

    pub fn add_symbol(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name);
    }

    /// Build a source from a parsed dump
    ///
    /// # Errors
    /// * `SourceError::InvalidFormat` - empty names, duplicate siblings or
    ///   unparsable symbol addresses
    pub fn from_dump(dump: IntervalDump) -> Result<Self, SourceError> {
        if dump.trace.trim().is_empty() {
            return Err(SourceError::InvalidFormat("trace name is empty".to_string()));
        }

        let mut source = InMemorySource::new(dump.trace.clone());
        for (address, name) in &dump.symbols {
            source.add_symbol(parse_address(address)?, name.clone());
        }

        let root = ElementKey::new(dump.trace.clone(), &[]);
        let mut elements = Vec::with_capacity(dump.elements.len());
        for element in &dump.elements {
            elements.push(source.load_element(&root, element)?);
        }
        check_unique_names(&elements)?;
        source.elements = elements;

        for calls in source.calls.values_mut() {
            calls.sort_by_key(|c| (c.start, c.depth));
        }
        for statuses in source.statuses.values_mut() {
            statuses.sort_by_key(|s| s.start);
        }

        debug!(
            "Loaded trace '{}': {} elements with calls, {} symbols",
            source.trace,
            source.calls.len(),
            source.symbols.len()
        );
        Ok(source)
    }

    fn load_element(
        &mut self,
        parent: &ElementKey,
        dumped: &DumpElement,
    ) -> Result<Element, SourceError> {
        if dumped.name.trim().is_empty() {
            return Err(SourceError::InvalidFormat(format!(
                "element under {} has an empty name",
                parent
            )));
        }
        let key = parent.child(&dumped.name);

        let mut children = Vec::with_capacity(dumped.children.len());
        for child in &dumped.children {
            children.push(self.load_element(&key, child)?);
        }
        check_unique_names(&children)?;

        if !dumped.intervals.is_empty() {
            let calls = dumped
                .intervals
                .iter()
                .map(|i| CallInterval {
                    depth: i.depth,
                    call_site: match &i.symbol {
                        DumpSymbol::Address(address) => CallSite::Address(*address),
                        DumpSymbol::Name(name) => CallSite::Function(name.clone()),
                    },
                    start: i.start,
                    end: i.end,
                })
                .collect();
            self.calls.insert(key.clone(), calls);
        }
        if !dumped.statuses.is_empty() {
            let statuses = dumped
                .statuses
                .iter()
                .map(|s| StatusInterval::new(s.status, s.start, s.end))
                .collect();
            self.statuses.insert(key.clone(), statuses);
        }

        Ok(Element::new(key, dumped.name.clone()).with_children(children))
    }

    /// Total number of call intervals held
    pub fn interval_count(&self) -> usize {
        self.calls.values().map(Vec::len).sum()
    }
}

impl IntervalSource for InMemorySource {
    fn trace_name(&self) -> &str {
        &self.trace
    }

    fn elements(&self) -> Vec<Element> {
        self.elements.clone()
    }

    fn time_bounds(&self) -> TimeRange {
        let calls = self.calls.values().flatten().map(|c| (c.start, c.end));
        let statuses = self.statuses.values().flatten().map(|s| (s.start, s.end));
        calls
            .chain(statuses)
            .fold(None, |bounds: Option<TimeRange>, (start, end)| {
                let end = end.max(start);
                Some(match bounds {
                    None => TimeRange::new(start, end),
                    Some(b) => TimeRange::new(b.start.min(start), b.end.max(end)),
                })
            })
            .unwrap_or(TimeRange::new(0, 0))
    }

    fn intervals(&self, element: &ElementKey, window: TimeRange) -> Vec<CallInterval> {
        self.calls
            .get(element)
            .map(|calls| calls.iter().filter_map(|c| c.clipped(&window)).collect())
            .unwrap_or_default()
    }

    fn statuses(&self, element: &ElementKey, window: TimeRange) -> Vec<StatusInterval> {
        self.statuses
            .get(element)
            .map(|statuses| statuses.iter().filter_map(|s| s.clipped(&window)).collect())
            .unwrap_or_default()
    }

    fn symbols(&self) -> SymbolTable {
        self.symbols.clone()
    }
}

/// Parse a dump from a JSON string
///
/// **Public** - used by tests and by [`load_dump`]
pub fn parse_dump(json: &str) -> Result<InMemorySource, SourceError> {
    let dump: IntervalDump = serde_json::from_str(json)?;
    InMemorySource::from_dump(dump)
}

/// Load a dump from a JSON file
///
/// # Errors
/// * `SourceError::ReadFailed` - file cannot be read
/// * `SourceError::JsonError` - file is not a valid dump
/// * `SourceError::InvalidFormat` - dump content is inconsistent
pub fn load_dump(path: impl AsRef<Path>) -> Result<InMemorySource, SourceError> {
    let path = path.as_ref();
    info!("Reading interval dump: {}", path.display());
    let contents = fs::read_to_string(path)?;
    parse_dump(&contents)
}

fn parse_address(text: &str) -> Result<u64, SourceError> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| SourceError::InvalidFormat(format!("invalid symbol address '{}'", text)))
}

fn check_unique_names(siblings: &[Element]) -> Result<(), SourceError> {
    for (i, element) in siblings.iter().enumerate() {
        if siblings[..i].iter().any(|other| other.key == element.key) {
            return Err(SourceError::InvalidFormat(format!(
                "duplicate element {}",
                element.key
            )));
        }
    }
    Ok(())
}
