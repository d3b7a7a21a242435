//! Dispute types
//!
//! A dispute pauses the owning escrow account and redirects its funds at
//! resolution time. The dispute holds a back-reference only — the
//! `EscrowAccount` stays the source of truth for money.

use crate::{DisputeId, EscrowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which party filed the claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeParty {
    Buyer,
    Seller,
}

/// Lifecycle state of a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    /// Filed, awaiting triage
    Open,
    /// Under active review
    Investigating,
    /// Closed by a resolution action (terminal)
    Resolved,
    /// Handed to manual takeover — no further automated transitions
    Escalated,
}

impl DisputeStatus {
    /// Whether the coordinator may still resolve this dispute
    pub fn is_resolvable(&self) -> bool {
        matches!(self, Self::Open | Self::Investigating)
    }

    /// Short name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Investigating => "Investigating",
            Self::Resolved => "Resolved",
            Self::Escalated => "Escalated",
        }
    }
}

/// How a resolved dispute redirects the escrowed funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeResolution {
    /// Release the full remaining balance to the seller
    ReleaseToSeller,
    /// Refund the full remaining balance to the buyer
    RefundToBuyer,
    /// Release a bounded portion to the seller; the account returns to InProgress
    PartialRelease,
}

/// A claim filed by one party against a funded escrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub escrow_id: EscrowId,
    pub initiated_by: DisputeParty,
    pub reason: String,
    pub details: String,
    /// Opaque attachment references
    pub evidence: Vec<String>,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    pub resolution_notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Create a freshly filed dispute
    pub fn open(
        escrow_id: EscrowId,
        initiated_by: DisputeParty,
        reason: String,
        details: String,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            id: DisputeId::new(),
            escrow_id,
            initiated_by,
            reason,
            details,
            evidence,
            status: DisputeStatus::Open,
            resolution: None,
            resolution_notes: None,
            opened_at: Utc::now(),
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolvability() {
        assert!(DisputeStatus::Open.is_resolvable());
        assert!(DisputeStatus::Investigating.is_resolvable());
        assert!(!DisputeStatus::Resolved.is_resolvable());
        assert!(!DisputeStatus::Escalated.is_resolvable());
    }

    #[test]
    fn test_open_dispute_defaults() {
        let dispute = Dispute::open(
            EscrowId::new(),
            DisputeParty::Buyer,
            "undelivered".to_string(),
            "package never arrived".to_string(),
            vec!["photo_1".to_string()],
        );
        assert_eq!(dispute.status, DisputeStatus::Open);
        assert!(dispute.resolution.is_none());
        assert!(dispute.resolved_at.is_none());
    }
}
