use anyhow::{Context, Result};
use std::path::Path;

use crate::source::{leaf_elements, load_dump, IntervalSource};
use crate::utils::config::SCHEMA_VERSION;

/// Validate an interval dump file
pub fn validate_dump_file(file_path: &Path) -> Result<()> {
    println!("Validating interval dump: {}", file_path.display());

    let source = load_dump(file_path)
        .with_context(|| format!("Invalid interval dump {}", file_path.display()))?;
    let elements = source.elements();

    println!("✓ Valid interval dump");
    println!("  Trace: {}", source.trace_name());
    println!("  Time Bounds: {}", source.time_bounds());
    println!("  Root Elements: {}", elements.len());
    println!("  Threads: {}", leaf_elements(&elements).len());
    println!("  Intervals: {}", source.interval_count());
    println!("  Symbols: {}", source.symbols().len());

    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("Callgraph Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Aggregated calling-context trees and differential call graphs.");
}
