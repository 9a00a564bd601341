//! Retry Policy Module
//!
//! Retry tuning per network quality tier, the pure retry decision, and the
//! jittered exponential backoff schedule.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::network::{ErrorKind, NetworkQuality};

// == Retry Config ==
/// Retry tuning for one request or one quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound of the random component added to each delay
    pub jitter_range: Duration,
}

impl RetryConfig {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
            jitter_range: Duration::ZERO,
        }
    }

    /// Default tuning for a quality tier. Better links retry less and sooner.
    pub fn for_quality(quality: NetworkQuality) -> Self {
        let ms = Duration::from_millis;
        match quality {
            NetworkQuality::Excellent => Self {
                max_attempts: 2,
                base_delay: ms(500),
                max_delay: ms(5_000),
                backoff_factor: 2.0,
                jitter_range: ms(200),
            },
            NetworkQuality::Good => Self {
                max_attempts: 3,
                base_delay: ms(1_000),
                max_delay: ms(10_000),
                backoff_factor: 2.0,
                jitter_range: ms(500),
            },
            NetworkQuality::Fair => Self {
                max_attempts: 4,
                base_delay: ms(2_000),
                max_delay: ms(20_000),
                backoff_factor: 2.0,
                jitter_range: ms(1_000),
            },
            NetworkQuality::Poor => Self {
                max_attempts: 5,
                base_delay: ms(3_000),
                max_delay: ms(30_000),
                backoff_factor: 2.0,
                jitter_range: ms(2_000),
            },
            NetworkQuality::Offline => Self::no_retry(),
        }
    }
}

// == Retry Table ==
/// Retry tuning for every quality tier; each tier can be overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryTable {
    pub excellent: RetryConfig,
    pub good: RetryConfig,
    pub fair: RetryConfig,
    pub poor: RetryConfig,
    pub offline: RetryConfig,
}

impl Default for RetryTable {
    fn default() -> Self {
        Self {
            excellent: RetryConfig::for_quality(NetworkQuality::Excellent),
            good: RetryConfig::for_quality(NetworkQuality::Good),
            fair: RetryConfig::for_quality(NetworkQuality::Fair),
            poor: RetryConfig::for_quality(NetworkQuality::Poor),
            offline: RetryConfig::for_quality(NetworkQuality::Offline),
        }
    }
}

impl RetryTable {
    /// Same tuning for every tier. Mostly useful in tests.
    pub fn uniform(config: RetryConfig) -> Self {
        Self {
            excellent: config,
            good: config,
            fair: config,
            poor: config,
            offline: config,
        }
    }

    pub fn for_quality(&self, quality: NetworkQuality) -> RetryConfig {
        match quality {
            NetworkQuality::Excellent => self.excellent,
            NetworkQuality::Good => self.good,
            NetworkQuality::Fair => self.fair,
            NetworkQuality::Poor => self.poor,
            NetworkQuality::Offline => self.offline,
        }
    }

    /// Replaces the tuning of one tier.
    pub fn with_override(mut self, quality: NetworkQuality, config: RetryConfig) -> Self {
        match quality {
            NetworkQuality::Excellent => self.excellent = config,
            NetworkQuality::Good => self.good = config,
            NetworkQuality::Fair => self.fair = config,
            NetworkQuality::Poor => self.poor = config,
            NetworkQuality::Offline => self.offline = config,
        }
        self
    }
}

// == Retry Decision ==
/// Decides whether a failed attempt is retried.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub fn should_retry(kind: ErrorKind, attempt: u32, max_attempts: u32, is_online: bool) -> bool {
    if !is_online || attempt >= max_attempts {
        return false;
    }

    match kind {
        ErrorKind::Network | ErrorKind::Timeout => true,
        ErrorKind::Http(status) => status >= 500 || matches!(status, 408 | 409 | 429),
        ErrorKind::Offline | ErrorKind::Cancelled | ErrorKind::Programming => false,
    }
}

// == Backoff ==
/// Delay before the retry that follows failed attempt `attempt`.
///
/// `min(base * factor^(attempt-1) + jitter, max_delay)`, never below `base`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32, jitter: Duration) -> Duration {
    let base_ms = config.base_delay.as_millis() as f64;
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let grown = base_ms * config.backoff_factor.max(1.0).powi(exponent);
    let capped = (grown + jitter.as_millis() as f64).min(config.max_delay.as_millis() as f64);

    Duration::from_millis(capped.max(base_ms).round() as u64)
}

/// Draws a uniform jitter in `[0, range]` at millisecond resolution.
pub fn sample_jitter(range: Duration) -> Duration {
    let max_ms = range.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
            jitter_range: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_retry_allow_list() {
        for status in [408, 409, 429, 500, 502, 503] {
            assert!(should_retry(ErrorKind::Http(status), 1, 3, true), "{}", status);
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!should_retry(ErrorKind::Http(status), 1, 3, true), "{}", status);
        }
    }

    #[test]
    fn test_network_and_timeout_retry() {
        assert!(should_retry(ErrorKind::Network, 1, 3, true));
        assert!(should_retry(ErrorKind::Timeout, 2, 3, true));
    }

    #[test]
    fn test_never_retry_cancel_or_programming() {
        assert!(!should_retry(ErrorKind::Cancelled, 1, 3, true));
        assert!(!should_retry(ErrorKind::Programming, 1, 3, true));
        assert!(!should_retry(ErrorKind::Offline, 1, 3, true));
    }

    #[test]
    fn test_never_retry_offline() {
        assert!(!should_retry(ErrorKind::Http(503), 1, 3, false));
        assert!(!should_retry(ErrorKind::Network, 1, 3, false));
    }

    #[test]
    fn test_attempts_exhausted() {
        assert!(should_retry(ErrorKind::Http(429), 2, 3, true));
        assert!(!should_retry(ErrorKind::Http(429), 3, 3, true));
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let c = config();
        assert_eq!(backoff_delay(&c, 1, Duration::ZERO), Duration::from_millis(100));
        assert_eq!(backoff_delay(&c, 2, Duration::ZERO), Duration::from_millis(200));
        assert_eq!(backoff_delay(&c, 3, Duration::ZERO), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_adds_jitter_and_caps() {
        let c = config();
        assert_eq!(
            backoff_delay(&c, 2, Duration::from_millis(30)),
            Duration::from_millis(230)
        );
        assert_eq!(backoff_delay(&c, 10, Duration::ZERO), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_floor_is_base_delay() {
        let mut c = config();
        c.max_delay = Duration::from_millis(10);
        assert_eq!(backoff_delay(&c, 3, Duration::ZERO), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_within_range() {
        for _ in 0..100 {
            let j = sample_jitter(Duration::from_millis(50));
            assert!(j <= Duration::from_millis(50));
        }
        assert_eq!(sample_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_quality_tiers_are_monotonic() {
        let table = RetryTable::default();
        let excellent = table.for_quality(NetworkQuality::Excellent);
        let poor = table.for_quality(NetworkQuality::Poor);

        assert!(excellent.max_attempts < poor.max_attempts);
        assert!(excellent.base_delay < poor.base_delay);
        assert!(excellent.jitter_range < poor.jitter_range);
        assert_eq!(table.for_quality(NetworkQuality::Offline).max_attempts, 1);
    }

    #[test]
    fn test_table_override() {
        let table = RetryTable::default().with_override(NetworkQuality::Good, RetryConfig::no_retry());
        assert_eq!(table.for_quality(NetworkQuality::Good).max_attempts, 1);
        assert_eq!(table.for_quality(NetworkQuality::Fair).max_attempts, 4);
    }
}
