//! Trustline Types - Canonical domain types for the escrow engine
//!
//! This crate contains all foundational types for Trustline with zero
//! dependencies on other trustline crates. It defines:
//!
//! - Identity types (EscrowId, MilestoneId, DisputeId, etc.)
//! - Currency and fixed-point amount types
//! - Escrow account and milestone types with their status machines
//! - Dispute types and resolution outcomes
//! - The error taxonomy shared by every trustline crate
//!
//! # Architectural Invariants
//!
//! These types support the core Trustline guarantees:
//!
//! 1. `0 <= released <= principal` in every reachable account state
//! 2. Released and Refunded accounts are terminal — nothing mutates them
//! 3. An account can only become Disputed from Funded or InProgress
//! 4. Amount arithmetic is checked fixed-point, never floating point

pub mod identity;
pub mod currency;
pub mod amount;
pub mod escrow;
pub mod dispute;
pub mod error;

pub use identity::*;
pub use currency::*;
pub use amount::*;
pub use escrow::*;
pub use dispute::*;
pub use error::*;
