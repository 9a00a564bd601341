//! Request DTOs for the diagnostics API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::network::{EffectiveType, NetworkSignal};
use crate::orchestrator::{CleanupMode, Visibility};

/// Request body for POST /cleanup
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupRequest {
    pub mode: CleanupMode,
}

/// Request body for POST /lifecycle
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleRequest {
    pub visibility: Visibility,
}

/// Request body for POST /network
///
/// # Fields
/// - `online`: Whether the host reports connectivity
/// - `effective_type`: `slow-2g`, `2g`, `3g`, `4g` or omitted
/// - `downlink_mbps`: Optional bandwidth estimate
/// - `rtt_ms`: Optional round-trip estimate
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSignalRequest {
    pub online: bool,
    #[serde(default)]
    pub effective_type: EffectiveType,
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
    #[serde(default)]
    pub rtt_ms: Option<u32>,
}

impl NetworkSignalRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(downlink) = self.downlink_mbps {
            if !downlink.is_finite() || downlink < 0.0 {
                return Some("downlink_mbps must be a non-negative number".to_string());
            }
        }
        None
    }

    pub fn into_signal(self) -> NetworkSignal {
        NetworkSignal {
            online: self.online,
            effective_type: self.effective_type,
            downlink_mbps: self.downlink_mbps,
            rtt_ms: self.rtt_ms,
        }
    }
}
