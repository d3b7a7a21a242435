//! Trustline Engine - escrow lifecycle, milestone ledger, dispute coordination
//!
//! The engine owns every state transition of an [`trustline_types::EscrowAccount`]:
//! funding, milestone approval and release, full release, refund, and the
//! dispute flow that pauses or redirects funds. Each operation is a
//! self-contained read-check-write sequence committed through the store's
//! compare-and-swap, so concurrent writers against the same account get
//! exactly one winner and a typed `VersionConflict` for the loser.
//!
//! # Guarantees
//!
//! 1. `0 <= released <= principal` in every committed state
//! 2. Released/Refunded accounts never mutate again
//! 3. Money moves through the gateway before the transition commits;
//!    a declined or timed-out gateway call leaves the account unchanged
//! 4. Notification failures never block or reverse a committed transition

pub mod config;
pub mod fees;
pub mod ledger;
pub mod escrow;
pub mod dispute;

pub use config::EngineConfig;
pub use fees::{FeeSchedule, FeeTier};
pub use ledger::LedgerError;
pub use escrow::EscrowEngine;
pub use dispute::DisputeCoordinator;
