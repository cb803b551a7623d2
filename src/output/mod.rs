//! Output writers for reports and call graph snapshots.
//!
//! This module handles writing data to disk:
//! - JSON diff reports
//! - JSON call graph snapshots

pub mod json;

// Re-export main functions
pub use json::{read_report, report_to_string, write_report, write_snapshot};
