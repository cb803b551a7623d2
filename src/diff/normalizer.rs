//! Metric selection and difference arithmetic.
//!
//! Handles the math of comparing two node weights, including the
//! zero-baseline edge cases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DiffError;
use crate::aggregator::AggregatedNode;

/// Node value a diff is computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Metric {
    #[default]
    Duration,
    SelfTime,
}

impl Metric {
    /// Weight of a node under this metric
    pub fn weight(&self, node: &AggregatedNode) -> u64 {
        match self {
            Metric::Duration => node.duration(),
            Metric::SelfTime => node.self_time(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Duration => "Duration",
            Metric::SelfTime => "SelfTime",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duration" => Ok(Metric::Duration),
            "selftime" | "self_time" | "self-time" => Ok(Metric::SelfTime),
            _ => Err(DiffError::UnknownMetric(s.to_string())),
        }
    }
}

impl TryFrom<String> for Metric {
    type Error = DiffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.name().to_string()
    }
}

/// Signed ratio of change from `other` (baseline) to `base` (comparison)
///
/// `(base - other) / other`, so 0.5 means 50% more. A zero baseline gives
/// +∞ when the comparison has weight and 0.0 when it has none.
pub fn relative_difference(base: u64, other: u64) -> f64 {
    if other == 0 {
        if base == 0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (base as f64 - other as f64) / other as f64
    }
}

/// Percentage view of a ratio, used by thresholds and the terminal output
pub fn as_percent(difference: f64) -> f64 {
    difference * 100.0
}
