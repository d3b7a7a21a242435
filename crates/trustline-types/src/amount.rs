//! Fixed-point amount type
//!
//! Trustline uses i128 minor units (cents for USD) for all amounts to
//! ensure overflow-safe arithmetic with no rounding drift across repeated
//! partial releases. Binary floating point never enters invariant math.

use crate::{Currency, Result, TrustlineError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// An amount of money in a single currency, held in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Value in the currency's minor units (e.g. cents)
    pub minor: i128,
    /// The currency
    pub currency: Currency,
}

impl Amount {
    /// Create an amount from minor units
    pub fn from_minor(minor: i128, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Create an amount from whole major units (e.g. `Amount::major(1000, USD)` is $1000.00)
    pub fn major(major: i128, currency: Currency) -> Self {
        Self {
            minor: major * currency.minor_units_per_major(),
            currency,
        }
    }

    /// Create a zero amount
    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Check if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Checked addition (currencies must match)
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(TrustlineError::AmountOverflow)?;
        Ok(Self { minor, ..self })
    }

    /// Checked subtraction (currencies must match)
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let minor = self
            .minor
            .checked_sub(other.minor)
            .ok_or(TrustlineError::AmountOverflow)?;
        Ok(Self { minor, ..self })
    }

    /// Multiply by basis points (100 bps = 1%), rounding toward zero
    pub fn basis_points(self, bps: u32) -> Result<Self> {
        let minor = self
            .minor
            .checked_mul(bps as i128)
            .ok_or(TrustlineError::AmountOverflow)?
            / 10_000;
        Ok(Self { minor, ..self })
    }

    /// Multiply by a percentage of principal (0-100)
    pub fn percentage(self, percent: u8) -> Result<Self> {
        self.basis_points(percent as u32 * 100)
    }

    fn require_same_currency(&self, other: &Self) -> Result<()> {
        if self.currency != other.currency {
            return Err(TrustlineError::CurrencyMismatch {
                expected: self.currency.code(),
                actual: other.currency.code(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = self.currency.minor_units_per_major();
        if scale == 1 {
            write!(f, "{} {}", self.minor, self.currency)
        } else {
            let major = self.minor / scale;
            let frac = (self.minor % scale).abs();
            write!(
                f,
                "{}.{:0width$} {}",
                major,
                frac,
                self.currency,
                width = self.currency.decimals() as usize
            )
        }
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.minor.partial_cmp(&other.minor)
    }
}
