//! Configuration and constants for comparisons and the CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::error::ConfigError;
use crate::diff::{Metric, ThresholdConfig};
use crate::source::TimeRange;

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Element receiving the merged trees of one comparison side
pub const MERGE_GROUP_NAME: &str = "Merge";

/// Differences of at most 5% are reported as unchanged
pub const DEFAULT_NO_DIFFERENCE_BAND: f64 = 0.05;

/// Increases of 100% or more reach full intensity
pub const DEFAULT_MIN_THRESHOLD: f64 = 1.0;

/// How the two sides of a comparison are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Merge every tree of a side into one group and compare the groups
    #[default]
    Merged,
    /// Pair elements across sides and compare each pair
    Paired,
}

/// Complete comparison configuration
///
/// **Public** - loaded from TOML, CLI flags override individual fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    #[serde(default)]
    pub metric: Metric,

    #[serde(default)]
    pub mode: ComparisonMode,

    /// Window of the baseline side, the whole trace when absent
    #[serde(default)]
    pub baseline_window: Option<TimeRange>,

    /// Window of the target side, the whole trace when absent
    #[serde(default)]
    pub target_window: Option<TimeRange>,

    /// Name of the merged group element
    #[serde(default = "default_group_name")]
    pub group_name: String,

    /// Divide each merged side by its number of traces
    #[serde(default)]
    pub average_runs: bool,

    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

fn default_group_name() -> String {
    MERGE_GROUP_NAME.to_string()
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            mode: ComparisonMode::default(),
            baseline_window: None,
            target_window: None,
            group_name: default_group_name(),
            average_runs: false,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl ComparisonConfig {
    /// # Errors
    /// * `ConfigError::Invalid` - A window is inverted, the group is unnamed or a threshold is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (side, window) in [("baseline", self.baseline_window), ("target", self.target_window)] {
            if let Some(window) = window {
                if window.end < window.start {
                    return Err(ConfigError::Invalid(format!(
                        "{} window {} ends before it starts",
                        side, window
                    )));
                }
            }
        }
        if self.group_name.trim().is_empty() {
            return Err(ConfigError::Invalid("group_name is empty".to_string()));
        }
        self.thresholds
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Load a comparison configuration from a TOML file
///
/// # Errors
/// * `ConfigError::ReadFailed` - If file cannot be read
/// * `ConfigError::ParseFailed` - If TOML is invalid
/// * `ConfigError::Invalid` - If a value is out of range
pub fn load_config(path: impl AsRef<Path>) -> Result<ComparisonConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: ComparisonConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
