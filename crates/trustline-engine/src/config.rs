//! Engine configuration

use std::time::Duration;

use crate::fees::FeeSchedule;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on any single payment/payout gateway call.
    ///
    /// An elapsed call surfaces as `GatewayTimeout` ("unknown outcome")
    /// and leaves the account unchanged.
    pub gateway_timeout: Duration,
    /// Platform fee schedule applied once at account creation
    pub fees: FeeSchedule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            fees: FeeSchedule::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gateway_timeout: std::env::var("TRUSTLINE_GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_timeout),
            fees: FeeSchedule::from_env(),
        }
    }
}
