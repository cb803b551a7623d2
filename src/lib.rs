//! Callgraph Studio
//!
//! Aggregated calling-context trees and differential call graphs built
//! from call-stack interval traces.
//!
//! This crate provides the core implementation for the
//! `callgraph` CLI tool:
//!
//! * [`aggregator`] turns ordered call-stack intervals into a calling-context
//!   tree per thread and merges trees of the same shape
//! * [`diff`] pairs elements across two traces and computes the relative
//!   difference of every node
//! * [`comparison`] runs a complete baseline/target comparison from a
//!   [`utils::config::ComparisonConfig`]
//!
//! ## Getting Started
//!
//! ```bash
//! callgraph build --input trace.json --summary
//! callgraph diff --baseline before.json --target after.json --summary
//! ```

pub mod aggregator;
pub mod callsite;
pub mod commands;
pub mod comparison;
pub mod diff;
pub mod output;
pub mod source;
pub mod utils;
