//! Currency types for Trustline
//!
//! Escrowed funds are fiat-denominated; conversion happens before funds
//! enter escrow, so a single ISO 4217 code per account is enough.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fiat currency codes (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    AUD,
    CAD,
    SGD,
    INR,
    BRL,
}

impl Currency {
    /// Get the standard decimal places for this currency
    pub fn decimals(&self) -> u8 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Get the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::JPY => "JPY",
            Self::CHF => "CHF",
            Self::AUD => "AUD",
            Self::CAD => "CAD",
            Self::SGD => "SGD",
            Self::INR => "INR",
            Self::BRL => "BRL",
        }
    }

    /// The multiplier from major units to minor units (e.g. 100 for USD)
    pub fn minor_units_per_major(&self) -> i128 {
        10i128.pow(self.decimals() as u32)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
