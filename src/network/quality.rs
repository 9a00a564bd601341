//! Network Quality Module
//!
//! Classifies raw connectivity signals into an ordinal quality and derives the
//! caching strategy for each quality tier. Both are pure functions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Effective Type ==
/// Connection class reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

// == Network Quality ==
/// Ordinal connection quality. Ordering runs from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Offline,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl NetworkQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkQuality::Offline => "offline",
            NetworkQuality::Poor => "poor",
            NetworkQuality::Fair => "fair",
            NetworkQuality::Good => "good",
            NetworkQuality::Excellent => "excellent",
        }
    }
}

// == Signals and State ==
/// One raw reading of host connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSignal {
    pub online: bool,
    #[serde(default)]
    pub effective_type: EffectiveType,
    /// Estimated downlink in megabits per second
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
    /// Estimated round-trip time in milliseconds
    #[serde(default)]
    pub rtt_ms: Option<u32>,
}

impl NetworkSignal {
    pub fn online(effective_type: EffectiveType) -> Self {
        Self {
            online: true,
            effective_type,
            downlink_mbps: None,
            rtt_ms: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            effective_type: EffectiveType::Unknown,
            downlink_mbps: None,
            rtt_ms: None,
        }
    }

    pub fn with_downlink(mut self, mbps: f64) -> Self {
        self.downlink_mbps = Some(mbps);
        self
    }

    pub fn with_rtt(mut self, rtt_ms: u32) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }
}

/// Classified connectivity as seen by the rest of the subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkState {
    pub online: bool,
    pub effective_type: EffectiveType,
    pub quality: NetworkQuality,
    pub estimated_bandwidth_mbps: Option<f64>,
}

impl NetworkState {
    /// Builds the classified state for a raw signal.
    pub fn from_signal(signal: &NetworkSignal) -> Self {
        Self {
            online: signal.online,
            effective_type: signal.effective_type,
            quality: classify(signal),
            estimated_bandwidth_mbps: signal.downlink_mbps,
        }
    }

    /// Strategy for this state's quality tier.
    pub fn strategy(&self) -> NetworkStrategy {
        NetworkStrategy::for_quality(self.quality)
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::from_signal(&NetworkSignal::online(EffectiveType::Unknown))
    }
}

// == Classification ==
/// Downlink at or above which a 4g link counts as excellent.
const EXCELLENT_DOWNLINK_MBPS: f64 = 10.0;
/// RTT at or below which a 4g link counts as excellent.
const EXCELLENT_RTT_MS: u32 = 100;
/// RTT above which a nominal 4g link is downgraded to fair.
const CONGESTED_RTT_MS: u32 = 400;

/// Maps a raw connectivity signal onto the ordinal quality scale.
pub fn classify(signal: &NetworkSignal) -> NetworkQuality {
    if !signal.online {
        return NetworkQuality::Offline;
    }

    match signal.effective_type {
        EffectiveType::FourG => {
            if signal.rtt_ms.is_some_and(|rtt| rtt > CONGESTED_RTT_MS) {
                return NetworkQuality::Fair;
            }
            let fast = signal
                .downlink_mbps
                .is_some_and(|d| d >= EXCELLENT_DOWNLINK_MBPS);
            let responsive = signal.rtt_ms.map_or(true, |rtt| rtt <= EXCELLENT_RTT_MS);
            if fast && responsive {
                NetworkQuality::Excellent
            } else {
                NetworkQuality::Good
            }
        }
        EffectiveType::ThreeG => NetworkQuality::Fair,
        EffectiveType::TwoG | EffectiveType::Slow2g => NetworkQuality::Poor,
        EffectiveType::Unknown => match signal.downlink_mbps {
            Some(d) if d >= EXCELLENT_DOWNLINK_MBPS => NetworkQuality::Excellent,
            Some(d) if d >= 2.0 => NetworkQuality::Good,
            Some(d) if d >= 0.5 => NetworkQuality::Fair,
            Some(_) => NetworkQuality::Poor,
            None => NetworkQuality::Good,
        },
    }
}

// == Network Strategy ==
/// Caching behavior tuned for a quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkStrategy {
    /// Page staleness window; slower links keep pages longer
    pub cache_ttl: Duration,
    pub preload_enabled: bool,
    pub max_concurrent_preloads: usize,
    /// Target image quality, 1-100
    pub compression_quality: u8,
}

impl NetworkStrategy {
    /// Returns the strategy for a quality tier.
    pub fn for_quality(quality: NetworkQuality) -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        match quality {
            NetworkQuality::Excellent => Self {
                cache_ttl: minutes(5),
                preload_enabled: true,
                max_concurrent_preloads: 6,
                compression_quality: 90,
            },
            NetworkQuality::Good => Self {
                cache_ttl: minutes(10),
                preload_enabled: true,
                max_concurrent_preloads: 4,
                compression_quality: 80,
            },
            NetworkQuality::Fair => Self {
                cache_ttl: minutes(20),
                preload_enabled: true,
                max_concurrent_preloads: 2,
                compression_quality: 70,
            },
            NetworkQuality::Poor => Self {
                cache_ttl: minutes(30),
                preload_enabled: false,
                max_concurrent_preloads: 0,
                compression_quality: 50,
            },
            NetworkQuality::Offline => Self {
                cache_ttl: minutes(24 * 60),
                preload_enabled: false,
                max_concurrent_preloads: 0,
                compression_quality: 50,
            },
        }
    }
}
