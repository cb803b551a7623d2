//! Threshold configuration, change classification and violation detection.
//!
//! Loads threshold policies from TOML and checks diff reports for
//! violations. Classification is a presentation layer: the raw differences
//! in the report are never altered.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::schema::{DiffNodeReport, DiffReport, DiffSummary, ThresholdViolation};
use super::DiffError;
use crate::utils::config::{DEFAULT_MIN_THRESHOLD, DEFAULT_NO_DIFFERENCE_BAND};

/// Category of a differential node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// No counterpart in the baseline
    New,
    /// Within the no-difference band
    Unchanged,
    Faster,
    Slower,
    /// The baseline counterpart has zero weight
    FromZero,
}

/// Classify a raw difference
///
/// `band` is a ratio: with 0.05, changes of 5% or less are unchanged.
pub fn classify(difference: f64, band: f64) -> ChangeKind {
    if difference.is_nan() {
        ChangeKind::New
    } else if difference.is_infinite() {
        ChangeKind::FromZero
    } else if difference.abs() <= band {
        ChangeKind::Unchanged
    } else if difference < 0.0 {
        ChangeKind::Faster
    } else {
        ChangeKind::Slower
    }
}

/// Normalise a difference into [-1, 1]
///
/// Decreases are bounded by -1 already. Increases are clamped at
/// `min_threshold`, so any increase of that ratio or more has intensity 1.
pub fn intensity(difference: f64, min_threshold: f64) -> f64 {
    if difference.is_nan() {
        0.0
    } else if difference < 0.0 {
        difference.max(-1.0)
    } else if min_threshold <= 0.0 || difference.is_infinite() {
        if difference > 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        (difference.min(min_threshold)) / min_threshold
    }
}

/// Complete threshold configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ThresholdConfig {
    /// Ratio under which a difference counts as none
    #[serde(default = "default_no_difference_band")]
    pub no_difference_band: f64,

    /// Ratio at which an increase reaches full intensity
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f64,

    /// Maximum allowed increase percentage of any node
    pub max_increase_percent: Option<f64>,

    /// Increase percentage that raises a warning
    pub warn_increase_percent: Option<f64>,

    /// Nodes lighter than this are never reported
    #[serde(default)]
    pub min_weight: u64,

    /// Treat call sites missing from the baseline as regressions
    #[serde(default)]
    pub fail_on_new: bool,
}

fn default_no_difference_band() -> f64 {
    DEFAULT_NO_DIFFERENCE_BAND
}

fn default_min_threshold() -> f64 {
    DEFAULT_MIN_THRESHOLD
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            no_difference_band: DEFAULT_NO_DIFFERENCE_BAND,
            min_threshold: DEFAULT_MIN_THRESHOLD,
            max_increase_percent: None,
            warn_increase_percent: None,
            min_weight: 0,
            fail_on_new: false,
        }
    }
}

impl ThresholdConfig {
    /// Reject values that cannot classify anything
    ///
    /// # Errors
    /// * `DiffError::InvalidThresholds` - A band or threshold is negative or not a number
    pub fn validate(&self) -> Result<(), DiffError> {
        if self.no_difference_band.is_nan() || self.no_difference_band < 0.0 {
            return Err(DiffError::InvalidThresholds(format!(
                "no_difference_band must be >= 0, got {}",
                self.no_difference_band
            )));
        }
        if self.min_threshold.is_nan() || self.min_threshold <= 0.0 {
            return Err(DiffError::InvalidThresholds(format!(
                "min_threshold must be > 0, got {}",
                self.min_threshold
            )));
        }
        for (name, value) in [
            ("max_increase_percent", self.max_increase_percent),
            ("warn_increase_percent", self.warn_increase_percent),
        ] {
            if let Some(value) = value {
                if value.is_nan() || value < 0.0 {
                    return Err(DiffError::InvalidThresholds(format!(
                        "{} must be >= 0, got {}",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load thresholds from a TOML file
///
/// # Arguments
/// * `path` - Path to the TOML configuration file
///
/// # Returns
/// Parsed and validated ThresholdConfig
///
/// # Errors
/// * `DiffError::IoError` - If file cannot be read
/// * `DiffError::ThresholdParseFailed` - If TOML is invalid
/// * `DiffError::InvalidThresholds` - If a value is out of range
pub fn load_thresholds(path: impl AsRef<Path>) -> Result<ThresholdConfig, DiffError> {
    let contents = fs::read_to_string(path)?;
    let config: ThresholdConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Check a diff report against thresholds and update violations
///
/// # Arguments
/// * `diff` - Mutable reference to diff report to update
/// * `config` - Threshold configuration to check against
///
/// # Returns
/// Vector of violations (also updates diff.threshold_violations)
pub fn check_thresholds(diff: &mut DiffReport, config: &ThresholdConfig) -> Vec<ThresholdViolation> {
    let metric = diff.metric.to_string();
    let mut violations = Vec::new();

    for group in &diff.groups {
        for tree in &group.trees {
            tree.walk(&mut |path, node| {
                if let Some(violation) = check_node(&group.name, path, node, &metric, config) {
                    violations.push(violation);
                }
            });
        }
    }

    // Update diff report
    diff.threshold_violations = violations.clone();
    update_summary(&mut diff.summary, &violations);

    violations
}

fn check_node(
    group: &str,
    path: &[&str],
    node: &DiffNodeReport,
    metric: &str,
    config: &ThresholdConfig,
) -> Option<ThresholdViolation> {
    if node.weight < config.min_weight {
        return None;
    }
    let location = format!("{}:{}", group, path.join(";"));

    let increase = match node.change {
        ChangeKind::New => {
            return config.fail_on_new.then(|| ThresholdViolation {
                metric: format!("{}.fail_on_new", metric),
                path: location,
                threshold: 0.0,
                actual: None,
                severity: "error".to_string(),
            });
        }
        ChangeKind::FromZero => f64::INFINITY,
        ChangeKind::Slower => node.difference.map(|d| d * 100.0)?,
        ChangeKind::Unchanged | ChangeKind::Faster => return None,
    };
    let actual = increase.is_finite().then_some(increase);

    if let Some(max) = config.max_increase_percent {
        if increase > max {
            return Some(ThresholdViolation {
                metric: format!("{}.max_increase_percent", metric),
                path: location,
                threshold: max,
                actual,
                severity: "error".to_string(),
            });
        }
    }
    if let Some(warn) = config.warn_increase_percent {
        if increase > warn {
            return Some(ThresholdViolation {
                metric: format!("{}.warn_increase_percent", metric),
                path: location,
                threshold: warn,
                actual,
                severity: "warning".to_string(),
            });
        }
    }
    None
}

/// Update the summary status based on violations
fn update_summary(summary: &mut DiffSummary, violations: &[ThresholdViolation]) {
    let error_count = violations.iter().filter(|v| v.severity == "error").count();
    let warning_count = violations
        .iter()
        .filter(|v| v.severity == "warning")
        .count();

    let status = if error_count > 0 {
        "FAILED"
    } else if warning_count > 0 {
        "WARNING"
    } else {
        "PASSED"
    };

    summary.has_regressions = error_count > 0;
    summary.violation_count = violations.len();
    summary.status = status.to_string();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(label: &str, weight: u64, difference: f64) -> DiffNodeReport {
        DiffNodeReport {
            label: label.to_string(),
            weight,
            difference: difference.is_finite().then_some(difference),
            change: classify(difference, DEFAULT_NO_DIFFERENCE_BAND),
            intensity: 0.0,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(f64::NAN, 0.05), ChangeKind::New);
        assert_eq!(classify(f64::INFINITY, 0.05), ChangeKind::FromZero);
        assert_eq!(classify(0.05, 0.05), ChangeKind::Unchanged);
        assert_eq!(classify(-0.05, 0.05), ChangeKind::Unchanged);
        assert_eq!(classify(0.06, 0.05), ChangeKind::Slower);
        assert_eq!(classify(-0.5, 0.05), ChangeKind::Faster);
    }

    #[test]
    fn test_intensity_clamps_increases() {
        assert_eq!(intensity(0.5, 1.0), 0.5);
        assert_eq!(intensity(3.0, 1.0), 1.0);
        assert_eq!(intensity(0.25, 0.5), 0.5);
        assert_eq!(intensity(-0.5, 1.0), -0.5);
        assert_eq!(intensity(f64::INFINITY, 1.0), 1.0);
        assert_eq!(intensity(f64::NAN, 1.0), 0.0);
    }

    #[test]
    fn test_increase_over_max_is_error() {
        let config = ThresholdConfig {
            max_increase_percent: Some(10.0),
            ..ThresholdConfig::default()
        };
        let violation = check_node("Merge", &["main"], &node("main", 150, 0.5), "Duration", &config)
            .unwrap();
        assert_eq!(violation.metric, "Duration.max_increase_percent");
        assert_eq!(violation.path, "Merge:main");
        assert_eq!(violation.actual, Some(50.0));
        assert_eq!(violation.severity, "error");
    }

    #[test]
    fn test_light_nodes_are_ignored() {
        let config = ThresholdConfig {
            max_increase_percent: Some(10.0),
            min_weight: 1000,
            ..ThresholdConfig::default()
        };
        assert!(check_node("g", &["main"], &node("main", 150, 0.5), "Duration", &config).is_none());
    }

    #[test]
    fn test_new_node_only_fails_when_asked() {
        let lenient = ThresholdConfig {
            max_increase_percent: Some(10.0),
            ..ThresholdConfig::default()
        };
        let new_node = node("fresh", 10, f64::NAN);
        assert!(check_node("g", &["fresh"], &new_node, "Duration", &lenient).is_none());

        let strict = ThresholdConfig {
            fail_on_new: true,
            ..lenient
        };
        let violation = check_node("g", &["fresh"], &new_node, "Duration", &strict).unwrap();
        assert_eq!(violation.actual, None);
    }

    #[test]
    fn test_from_zero_exceeds_any_limit() {
        let config = ThresholdConfig {
            max_increase_percent: Some(1000.0),
            ..ThresholdConfig::default()
        };
        let violation =
            check_node("g", &["idle"], &node("idle", 5, f64::INFINITY), "Duration", &config).unwrap();
        assert_eq!(violation.actual, None);
    }

    #[test]
    fn test_warning_summary() {
        let mut summary = DiffSummary::passed();
        let violations = vec![ThresholdViolation {
            metric: "test".to_string(),
            path: "g:main".to_string(),
            threshold: 10.0,
            actual: Some(20.0),
            severity: "warning".to_string(),
        }];
        update_summary(&mut summary, &violations);
        assert_eq!(summary.status, "WARNING");
        assert!(!summary.has_regressions);
        assert_eq!(summary.violation_count, 1);
    }

    #[test]
    fn test_validate_rejects_negative_band() {
        let config = ThresholdConfig {
            no_difference_band: -0.1,
            ..ThresholdConfig::default()
        };
        assert!(matches!(config.validate(), Err(DiffError::InvalidThresholds(_))));
    }
}
