use std::path::PathBuf;

use crate::diff::Metric;
use crate::source::TimeRange;
use crate::utils::config::ComparisonMode;

/// Arguments for the build command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    /// Interval dump to aggregate
    pub input: PathBuf,

    /// Output path for the JSON snapshot (optional)
    pub output: Option<PathBuf>,

    /// Time window, the whole trace when absent
    pub window: Option<TimeRange>,

    /// Print text summary to stdout
    pub print_summary: bool,
}

/// Arguments for the diff command
///
/// Every `Option` overrides the matching field of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct DiffArgs {
    /// Interval dumps of the baseline side
    pub baseline: Vec<PathBuf>,

    /// Interval dumps of the target side
    pub target: Vec<PathBuf>,

    /// Comparison configuration (TOML)
    pub config_file: Option<PathBuf>,

    pub metric: Option<Metric>,

    pub mode: Option<ComparisonMode>,

    pub baseline_window: Option<TimeRange>,

    pub target_window: Option<TimeRange>,

    /// Average each merged side over its traces
    pub average_runs: bool,

    /// Threshold configuration (TOML), replaces the `[thresholds]` table
    pub threshold_file: Option<PathBuf>,

    /// Maximum allowed increase percentage of any node
    pub threshold_percent: Option<f64>,

    /// Output path for the JSON report (optional)
    pub output: Option<PathBuf>,

    /// Print terminal summary
    pub summary: bool,
}

/// Parse a `start:end` window argument
pub fn parse_window(value: &str) -> Result<TimeRange, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", value))?;
    let start: u64 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid window start '{}': {}", start, e))?;
    let end: u64 = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid window end '{}': {}", end, e))?;
    if end < start {
        return Err(format!("window {}:{} ends before it starts", start, end));
    }
    Ok(TimeRange::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("10:20").unwrap(), TimeRange::new(10, 20));
        assert_eq!(parse_window(" 0 : 5 ").unwrap(), TimeRange::new(0, 5));
        assert!(parse_window("20:10").is_err());
        assert!(parse_window("10").is_err());
        assert!(parse_window("a:b").is_err());
    }
}
