//! JSON output writer.
//!
//! Writes diff reports and call graph snapshots to JSON files with proper
//! formatting.

use crate::aggregator::GraphSnapshot;
use crate::diff::DiffReport;
use crate::utils::error::OutputError;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write a diff report to a JSON file
///
/// **Public** - main entry point for report output
///
/// # Arguments
/// * `report` - Diff report to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_report(report: &DiffReport, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Writing diff report to: {}", output_path.display());
    write_json(report, output_path)
}

/// Write a call graph snapshot to a JSON file
///
/// **Public** - output of the `build` command
pub fn write_snapshot(
    snapshot: &GraphSnapshot,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Writing call graph snapshot to: {}", output_path.display());
    write_json(snapshot, output_path)
}

/// Serialise a report to a pretty JSON string
pub fn report_to_string(report: &DiffReport) -> Result<String, OutputError> {
    serde_json::to_string_pretty(report).map_err(OutputError::SerializationFailed)
}

fn write_json<T: Serialize>(value: &T, output_path: &Path) -> Result<(), OutputError> {
    // Validate path
    validate_output_path(output_path)?;

    // Create parent directories if needed
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    // Open file for writing
    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    // Serialize to JSON with pretty printing
    serde_json::to_writer_pretty(writer, value).map_err(OutputError::SerializationFailed)?;

    info!(
        "Written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    // Check if we're trying to overwrite a directory
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Calculate file size in bytes
///
/// **Private** - internal utility
fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a diff report from a JSON file
///
/// **Public** - useful for re-checking thresholds and for testing
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_report(input_path: impl AsRef<Path>) -> Result<DiffReport, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading diff report from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let report: DiffReport =
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Report loaded: version {}, {} groups",
        report.diff_version,
        report.groups.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffSummary, GroupReport, Metric, SideMetadata};
    use tempfile::NamedTempFile;

    fn create_test_report() -> DiffReport {
        DiffReport {
            diff_version: "1.0.0".to_string(),
            generated_at: "2024-01-01T00:00:00Z".to_string(),
            metric: Metric::SelfTime,
            pairing: None,
            baseline: SideMetadata {
                traces: vec!["baseline".to_string()],
                ..SideMetadata::default()
            },
            target: SideMetadata::default(),
            groups: vec![GroupReport {
                name: "Merge".to_string(),
                baseline_element: "Merge:/Merge".to_string(),
                comparison_element: "Merge:/Merge".to_string(),
                total_weight: 0,
                trees: Vec::new(),
            }],
            threshold_violations: Vec::new(),
            summary: DiffSummary::passed(),
        }
    }

    #[test]
    fn test_write_and_read_report() {
        let report = create_test_report();
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        write_report(&report, path).unwrap();
        let loaded = read_report(path).unwrap();

        assert_eq!(loaded.diff_version, report.diff_version);
        assert_eq!(loaded.metric, Metric::SelfTime);
        assert_eq!(loaded.baseline, report.baseline);
        assert_eq!(loaded.groups.len(), 1);
    }

    #[test]
    fn test_validate_output_path_empty() {
        let result = validate_output_path(Path::new(""));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = validate_output_path(temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/report.json");

        write_report(&create_test_report(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }
}
