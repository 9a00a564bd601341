//! Pressure Level Module
//!
//! Maps a usage ratio onto an ordinal pressure level. Pure functions only;
//! transition tracking lives in the sampler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Pressure Level ==
/// Ordinal memory pressure, from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureLevel::Low => "low",
            PressureLevel::Medium => "medium",
            PressureLevel::High => "high",
            PressureLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Pressure Thresholds ==
/// Four ascending usage ratios.
///
/// `medium`, `high` and `critical` are the level boundaries. `elevated` sits
/// between medium and high and switches the sampler to its fast interval
/// without changing the level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    pub medium: f64,
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            medium: 0.60,
            elevated: 0.75,
            high: 0.85,
            critical: 0.95,
        }
    }
}

impl PressureThresholds {
    /// Builds thresholds from four ratios in `(0, 1]`, strictly ascending.
    pub fn new(medium: f64, elevated: f64, high: f64, critical: f64) -> Result<Self, CacheError> {
        let values = [medium, elevated, high, critical];

        if values.iter().any(|v| !v.is_finite() || *v <= 0.0 || *v > 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "Pressure thresholds must lie in (0, 1]: {:?}",
                values
            )));
        }
        if values.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CacheError::InvalidConfig(format!(
                "Pressure thresholds must be strictly ascending: {:?}",
                values
            )));
        }

        Ok(Self {
            medium,
            elevated,
            high,
            critical,
        })
    }

    /// Builds thresholds from percentages, e.g. `[60.0, 75.0, 85.0, 95.0]`.
    pub fn from_percents(percents: [f64; 4]) -> Result<Self, CacheError> {
        let [a, b, c, d] = percents.map(|p| p / 100.0);
        Self::new(a, b, c, d)
    }

    /// Classifies a usage ratio.
    pub fn level_for(&self, ratio: f64) -> PressureLevel {
        if ratio >= self.critical {
            PressureLevel::Critical
        } else if ratio >= self.high {
            PressureLevel::High
        } else if ratio >= self.medium {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        }
    }

    /// True when sampling should switch to the fast interval.
    pub fn is_elevated(&self, ratio: f64) -> bool {
        ratio >= self.elevated
    }
}

impl FromStr for PressureThresholds {
    type Err = CacheError;

    /// Parses four comma-separated percentages, e.g. `"60,75,85,95"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| CacheError::InvalidConfig(format!("Invalid pressure threshold '{}': {}", s, e)))?;

        let percents: [f64; 4] = parsed.try_into().map_err(|v: Vec<f64>| {
            CacheError::InvalidConfig(format!("Expected 4 pressure thresholds, got {}", v.len()))
        })?;

        Self::from_percents(percents)
    }
}
