//! Leak Trend Module
//!
//! Least-squares regression of used bytes over the recent sample window.

use serde::Serialize;

use crate::memory::MemorySample;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const MS_PER_MINUTE: f64 = 60_000.0;

// == Leak Config ==
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeakConfig {
    /// Number of most recent samples regressed
    pub window: usize,
    /// Below this many samples no trend is reported
    pub min_samples: usize,
    /// Growth above which a confident trend counts as a leak
    pub growth_threshold_mb_per_min: f64,
    /// Minimum coefficient of determination
    pub confidence_threshold: f64,
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            window: 10,
            min_samples: 3,
            growth_threshold_mb_per_min: 1.0,
            confidence_threshold: 0.7,
        }
    }
}

// == Leak Report ==
/// Result of one trend analysis. Both inputs to the verdict are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LeakReport {
    pub is_leaking: bool,
    pub growth_rate_mb_per_min: f64,
    /// R² of the fit, 0.0 to 1.0
    pub confidence: f64,
    pub sample_count: usize,
}

// == Analysis ==
/// Regresses `used_bytes` against sample index over the last `config.window`
/// samples and converts the slope to MB/minute using the mean sample interval.
///
/// # Arguments
/// * `samples` - History, oldest first
/// * `config` - Window and thresholds
///
/// # Returns
/// A report with `is_leaking` set only when growth exceeds the threshold and
/// the fit is confident.
pub fn analyze(samples: &[MemorySample], config: &LeakConfig) -> LeakReport {
    let start = samples.len().saturating_sub(config.window);
    let window = &samples[start..];
    let n = window.len();

    if n < config.min_samples.max(2) {
        return LeakReport {
            sample_count: n,
            ..LeakReport::default()
        };
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = window.iter().map(|s| s.used_bytes as f64).sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, sample) in window.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (sample.used_bytes as f64 - mean_y);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, sample) in window.iter().enumerate() {
        let y = sample.used_bytes as f64;
        let fitted = intercept + slope * i as f64;
        ss_res += (y - fitted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }
    let confidence = if ss_tot == 0.0 {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    let span_ms = window[n - 1].timestamp_ms.saturating_sub(window[0].timestamp_ms) as f64;
    let mean_interval_ms = span_ms / (nf - 1.0);
    let growth_rate_mb_per_min = if mean_interval_ms > 0.0 {
        slope / mean_interval_ms * MS_PER_MINUTE / BYTES_PER_MB
    } else {
        0.0
    };

    LeakReport {
        is_leaking: growth_rate_mb_per_min > config.growth_threshold_mb_per_min
            && confidence > config.confidence_threshold,
        growth_rate_mb_per_min,
        confidence,
        sample_count: n,
    }
}
