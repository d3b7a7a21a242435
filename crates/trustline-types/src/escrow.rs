//! Escrow account and milestone types
//!
//! An `EscrowAccount` is the sole unit of shared mutable state: milestones
//! and the active dispute are owned by the account and committed together
//! with it, so a single compare-and-swap covers every invariant.

use crate::{
    Amount, Dispute, EscrowId, MilestoneId, OrderId, PartyId, Result, TrustlineError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an escrow account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Created, awaiting the buyer's funds
    Pending,
    /// Funds captured and held in trust
    Funded,
    /// At least one milestone approved or partially released
    InProgress,
    /// All funds released to the seller (terminal)
    Released,
    /// Remaining funds returned to the buyer (terminal)
    Refunded,
    /// A dispute is open; only resolution moves the account
    Disputed,
}

impl EscrowStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }

    /// Check if a dispute may be opened from this state
    pub fn can_dispute(&self) -> bool {
        matches!(self, Self::Funded | Self::InProgress)
    }

    /// Short name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Funded => "Funded",
            Self::InProgress => "InProgress",
            Self::Released => "Released",
            Self::Refunded => "Refunded",
            Self::Disputed => "Disputed",
        }
    }
}

/// Status of a single milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MilestoneStatus {
    /// Deliverable not yet accepted
    Pending,
    /// Deliverable accepted, payout not yet executed
    Approved,
    /// Payout executed (terminal)
    Released,
    /// Frozen by an open dispute
    Disputed,
}

impl MilestoneStatus {
    /// Short name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Released => "Released",
            Self::Disputed => "Disputed",
        }
    }
}

/// A partial deliverable tied to a portion of the escrowed principal.
///
/// Milestones have no identity outside their owning account; `id` is
/// unique within the account only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub description: String,
    pub amount: Amount,
    /// Share of the principal this milestone represents (0-100)
    pub percentage_of_principal: u8,
    pub status: MilestoneStatus,
    pub due_date: Option<DateTime<Utc>>,
    /// Set when the milestone is approved
    pub completed_date: Option<DateTime<Utc>>,
    /// Set when the milestone payout executes
    pub released_date: Option<DateTime<Utc>>,
    /// Opaque attachment references supporting the approval
    pub evidence: Vec<String>,
}

/// Milestone definition supplied at account creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneSpec {
    pub description: String,
    pub amount: Amount,
    pub percentage_of_principal: u8,
    pub due_date: Option<DateTime<Utc>>,
}

impl MilestoneSpec {
    /// Materialize the milestone in its initial state
    pub fn into_milestone(self) -> Milestone {
        Milestone {
            id: MilestoneId::new(),
            description: self.description,
            amount: self.amount,
            percentage_of_principal: self.percentage_of_principal,
            status: MilestoneStatus::Pending,
            due_date: self.due_date,
            completed_date: None,
            released_date: None,
            evidence: Vec::new(),
        }
    }
}

/// A trust-holding record for funds committed by a buyer pending release
/// to a seller.
///
/// Terminal accounts (Released, Refunded) are retained for audit and
/// never mutated again. The store's version stamp, not a field here,
/// orders committed mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub id: EscrowId,
    pub order_id: OrderId,
    pub buyer: PartyId,
    pub seller: PartyId,
    /// Immutable after funding
    pub principal: Amount,
    /// Platform fee, computed once at creation
    pub fee: Amount,
    /// Monotonically non-decreasing, never exceeds `principal`
    pub released: Amount,
    pub status: EscrowStatus,
    /// Ordered; empty means single lump-sum escrow
    pub milestones: Vec<Milestone>,
    /// The active or most recent dispute, committed under this account's version
    pub dispute: Option<Dispute>,
    pub created_at: DateTime<Utc>,
}

impl EscrowAccount {
    /// Look up a milestone by id
    pub fn milestone(&self, id: &MilestoneId) -> Option<&Milestone> {
        self.milestones.iter().find(|m| &m.id == id)
    }

    /// Whether this account tracks milestones at all
    pub fn has_milestones(&self) -> bool {
        !self.milestones.is_empty()
    }

    /// Sum of all milestone amounts
    pub fn milestones_total(&self) -> Result<Amount> {
        let mut total = Amount::zero(self.principal.currency);
        for m in &self.milestones {
            total = total.checked_add(m.amount)?;
        }
        Ok(total)
    }

    /// Funds still held in trust
    pub fn remaining(&self) -> Amount {
        Amount::from_minor(
            self.principal.minor - self.released.minor,
            self.principal.currency,
        )
    }

    /// Whether every milestone has been released (false for lump-sum accounts)
    pub fn all_milestones_released(&self) -> bool {
        self.has_milestones()
            && self
                .milestones
                .iter()
                .all(|m| m.status == MilestoneStatus::Released)
    }

    /// Check the terminal-state invariant
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Build an `InvalidState` error for an operation attempted on this account
    pub fn invalid_state(&self, operation: &'static str) -> TrustlineError {
        TrustlineError::InvalidState {
            escrow_id: self.id.to_string(),
            state: self.status.name().to_string(),
            operation,
        }
    }
}

/// Request to create an escrow account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEscrowRequest {
    pub order_id: OrderId,
    pub buyer: PartyId,
    pub seller: PartyId,
    pub principal: Amount,
    /// Empty for a lump-sum escrow
    pub milestones: Vec<MilestoneSpec>,
}

/// Payment instrument details supplied when funding an escrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Instrument identifier at the payment processor (tokenized card, bank ref, ...)
    pub instrument: String,
    /// Processor-specific metadata passed through opaquely
    pub metadata: serde_json::Value,
}
