//! Memory Sampler
//!
//! Folds samples into the history, tracks the pressure level state machine,
//! and re-runs leak analysis after every sample.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::memory::{
    analyze, LeakConfig, LeakReport, MemoryHistory, MemorySample, PressureLevel, PressureThresholds,
};

/// Upward move of the pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PressureTransition {
    pub from: PressureLevel,
    pub to: PressureLevel,
}

/// What changed as a result of recording one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub level: PressureLevel,
    /// Set only when the level moved up
    pub transition: Option<PressureTransition>,
    /// Set only when a leak was first detected
    pub leak: Option<LeakReport>,
    /// Usage is past the elevated threshold
    pub elevated: bool,
}

/// Point-in-time view for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStatus {
    pub latest: Option<MemorySample>,
    pub usage_ratio: f64,
    pub level: PressureLevel,
    pub leak: LeakReport,
    pub samples: usize,
}

// == Memory Sampler ==
#[derive(Debug)]
pub struct MemorySampler {
    history: MemoryHistory,
    thresholds: PressureThresholds,
    leak_config: LeakConfig,
    level: PressureLevel,
    leaking: bool,
    last_report: LeakReport,
}

impl MemorySampler {
    /// Creates a sampler with an empty history at `Low` pressure.
    ///
    /// # Arguments
    /// * `thresholds` - Level boundaries
    /// * `leak_config` - Regression window and verdict thresholds
    /// * `history_capacity` - Ring size
    pub fn new(thresholds: PressureThresholds, leak_config: LeakConfig, history_capacity: usize) -> Self {
        Self {
            history: MemoryHistory::new(history_capacity),
            thresholds,
            leak_config,
            level: PressureLevel::Low,
            leaking: false,
            last_report: LeakReport::default(),
        }
    }

    // == Record ==
    /// Records a sample and reports level transitions and new leaks.
    ///
    /// The level follows the latest sample in both directions, but only
    /// upward moves are reported. A leak is reported once per onset.
    pub fn record(&mut self, sample: MemorySample) -> SampleOutcome {
        self.history.push(sample);

        let ratio = sample.usage_ratio();
        let next = self.thresholds.level_for(ratio);
        let previous = self.level;
        self.level = next;

        let transition = if next > previous {
            info!(
                "Memory pressure rose: {} -> {} ({:.1}% of limit)",
                previous,
                next,
                ratio * 100.0
            );
            Some(PressureTransition { from: previous, to: next })
        } else {
            if next < previous {
                debug!("Memory pressure eased: {} -> {}", previous, next);
            }
            None
        };

        let report = analyze(&self.history.recent(self.leak_config.window), &self.leak_config);
        let leak = if report.is_leaking && !self.leaking {
            warn!(
                "Possible memory leak: +{:.2} MB/min (R² {:.2})",
                report.growth_rate_mb_per_min, report.confidence
            );
            Some(report)
        } else {
            None
        };
        self.leaking = report.is_leaking;
        self.last_report = report;

        SampleOutcome {
            level: next,
            transition,
            leak,
            elevated: self.thresholds.is_elevated(ratio),
        }
    }

    // == Accessors ==
    pub fn level(&self) -> PressureLevel {
        self.level
    }

    pub fn latest(&self) -> Option<&MemorySample> {
        self.history.latest()
    }

    pub fn leak_report(&self) -> LeakReport {
        self.last_report
    }

    pub fn history(&self) -> &MemoryHistory {
        &self.history
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }

    pub fn status(&self) -> MemoryStatus {
        let latest = self.history.latest().copied();
        MemoryStatus {
            usage_ratio: latest.map(|s| s.usage_ratio()).unwrap_or(0.0),
            latest,
            level: self.level,
            leak: self.last_report,
            samples: self.history.len(),
        }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new(
            PressureThresholds::default(),
            LeakConfig::default(),
            crate::memory::DEFAULT_HISTORY_CAPACITY,
        )
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1_000_000;

    fn at_percent(ts: u64, percent: u64) -> MemorySample {
        MemorySample::at(ts, LIMIT * percent / 100, LIMIT * 2, LIMIT)
    }

    #[test]
    fn test_one_event_per_upward_crossing() {
        let mut sampler = MemorySampler::default();
        let events: Vec<PressureLevel> = [50, 70, 90, 97]
            .iter()
            .enumerate()
            .filter_map(|(i, p)| sampler.record(at_percent(i as u64 * 1000, *p)).transition)
            .map(|t| t.to)
            .collect();

        assert_eq!(
            events,
            vec![PressureLevel::Medium, PressureLevel::High, PressureLevel::Critical]
        );
    }

    #[test]
    fn test_staying_in_level_is_silent() {
        let mut sampler = MemorySampler::default();
        assert!(sampler.record(at_percent(0, 65)).transition.is_some());
        assert!(sampler.record(at_percent(1000, 68)).transition.is_none());
        assert!(sampler.record(at_percent(2000, 61)).transition.is_none());
    }

    #[test]
    fn test_downward_move_is_tracked_but_silent() {
        let mut sampler = MemorySampler::default();
        sampler.record(at_percent(0, 90));
        let outcome = sampler.record(at_percent(1000, 40));

        assert!(outcome.transition.is_none());
        assert_eq!(sampler.level(), PressureLevel::Low);

        // Climbing again re-reports
        let outcome = sampler.record(at_percent(2000, 90));
        assert_eq!(outcome.transition.unwrap().to, PressureLevel::High);
    }

    #[test]
    fn test_elevated_flag() {
        let mut sampler = MemorySampler::default();
        assert!(!sampler.record(at_percent(0, 70)).elevated);
        assert!(sampler.record(at_percent(1000, 80)).elevated);
    }

    #[test]
    fn test_leak_reported_once_per_onset() {
        let mut sampler = MemorySampler::new(
            PressureThresholds::default(),
            LeakConfig::default(),
            50,
        );
        let mut reports = 0;
        for i in 0..10u64 {
            // 10 MB per second on a large limit
            let sample = MemorySample::at(i * 1000, (100 + i * 10) << 20, 8 << 30, 8 << 30);
            if sampler.record(sample).leak.is_some() {
                reports += 1;
            }
        }

        assert_eq!(reports, 1);
        assert!(sampler.leak_report().is_leaking);
    }

    #[test]
    fn test_status() {
        let mut sampler = MemorySampler::default();
        sampler.record(at_percent(0, 50));

        let status = sampler.status();
        assert_eq!(status.samples, 1);
        assert_eq!(status.usage_ratio, 0.5);
        assert_eq!(status.level, PressureLevel::Low);
    }
}
