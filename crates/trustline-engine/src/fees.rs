//! Platform fee calculation
//!
//! Pure functions over the principal amount; no I/O. The fee is computed
//! exactly once, at account creation, and stored immutably on the account.
//!
//! # Fee Structure
//!
//! | Tier       | Principal        | Rate   |
//! |------------|------------------|--------|
//! | Standard   | < $1,000         | 5.00%  |
//! | Volume     | $1,000 - $10,000 | 3.00%  |
//! | Enterprise | >= $10,000       | 2.00%  |
//!
//! Thresholds are in minor units of the account currency; a flat minimum
//! keeps micro-escrows from rounding the fee to zero.

use serde::{Deserialize, Serialize};

use trustline_types::{Amount, Result};

/// Principal at or above which the Volume rate applies (minor units)
const VOLUME_THRESHOLD_MINOR: i128 = 100_000;

/// Principal at or above which the Enterprise rate applies (minor units)
const ENTERPRISE_THRESHOLD_MINOR: i128 = 1_000_000;

/// Fee tier derived from the principal size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeTier {
    Standard,
    Volume,
    Enterprise,
}

impl FeeTier {
    /// Determine the tier for a principal in minor units
    pub fn from_principal_minor(minor: i128) -> Self {
        if minor >= ENTERPRISE_THRESHOLD_MINOR {
            FeeTier::Enterprise
        } else if minor >= VOLUME_THRESHOLD_MINOR {
            FeeTier::Volume
        } else {
            FeeTier::Standard
        }
    }
}

/// Platform fee schedule in basis points per tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub standard_bps: u32,
    pub volume_bps: u32,
    pub enterprise_bps: u32,
    /// Floor for the computed fee, in minor units of the account currency
    pub minimum_fee_minor: i128,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            standard_bps: 500,   // 5.00%
            volume_bps: 300,     // 3.00%
            enterprise_bps: 200, // 2.00%
            minimum_fee_minor: 50,
        }
    }
}

impl FeeSchedule {
    /// The basis-point rate for a given principal
    pub fn rate_bps(&self, principal: Amount) -> u32 {
        match FeeTier::from_principal_minor(principal.minor) {
            FeeTier::Standard => self.standard_bps,
            FeeTier::Volume => self.volume_bps,
            FeeTier::Enterprise => self.enterprise_bps,
        }
    }

    /// Compute the platform fee for a principal amount
    pub fn platform_fee(&self, principal: Amount) -> Result<Amount> {
        let fee = principal.basis_points(self.rate_bps(principal))?;
        if fee.minor < self.minimum_fee_minor {
            return Ok(Amount::from_minor(self.minimum_fee_minor, principal.currency));
        }
        Ok(fee)
    }

    /// Create a schedule from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bps = |var: &str, fallback: u32| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback)
        };
        Self {
            standard_bps: bps("TRUSTLINE_FEE_STANDARD_BPS", defaults.standard_bps),
            volume_bps: bps("TRUSTLINE_FEE_VOLUME_BPS", defaults.volume_bps),
            enterprise_bps: bps("TRUSTLINE_FEE_ENTERPRISE_BPS", defaults.enterprise_bps),
            minimum_fee_minor: std::env::var("TRUSTLINE_FEE_MINIMUM_MINOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.minimum_fee_minor),
        }
    }
}
