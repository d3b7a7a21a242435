//! Trustline Gateway - external adapter interfaces
//!
//! The engine moves money and sends alerts exclusively through these
//! traits. Adapters are at-least-once: the engine passes an idempotency
//! key derived from the escrow id + operation (+ milestone id) so a retry
//! after a transient timeout is never applied twice on the processor side.
//!
//! Adapter failures are explicit declines; the engine imposes its own
//! bounded timeout on top and maps elapsed calls to an "unknown outcome"
//! error, which is a different contract than a decline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use trustline_types::{Amount, DisputeId, EscrowId, MilestoneId, PartyId, TransactionId};

pub mod memory;

pub use memory::{MemoryNotifier, MemoryPaymentGateway, MemoryPayoutGateway, NullNotifier};

// =============================================================================
// Gateway Error
// =============================================================================

/// Failure reported by a payment or payout adapter.
///
/// There is deliberately no `Timeout` variant here: the engine bounds
/// adapter calls itself and treats elapsed time as "unknown outcome".
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The processor explicitly declined the operation
    #[error("declined: {reason}")]
    Declined { reason: String },

    /// The processor could not be reached or errored out
    #[error("gateway unavailable: {reason}")]
    Unavailable { reason: String },
}

// =============================================================================
// Idempotency
// =============================================================================

/// Caller-supplied token ensuring a retried external operation is not
/// applied more than once.
///
/// Keys are deterministic: the same escrow, operation, and milestone
/// always derive the same key, so a retry after a timeout deduplicates
/// on the processor side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for an escrow-level operation
    pub fn derive(escrow_id: &EscrowId, operation: &str) -> Self {
        Self(format!("{}:{}", escrow_id, operation))
    }

    /// Derive the key for a milestone-level operation
    pub fn derive_for_milestone(
        escrow_id: &EscrowId,
        operation: &str,
        milestone_id: &MilestoneId,
    ) -> Self {
        Self(format!("{}:{}:{}", escrow_id, operation, milestone_id))
    }

    /// Derive the key for a dispute-resolution operation
    pub fn derive_for_dispute(
        escrow_id: &EscrowId,
        operation: &str,
        dispute_id: &DisputeId,
    ) -> Self {
        Self(format!("{}:{}:{}", escrow_id, operation, dispute_id))
    }

    /// The wire representation sent to the processor
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Payment & Payout
// =============================================================================

/// Processor reference for a captured payment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentReference(pub String);

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Captures buyer funds into the platform's trust balance
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture `amount` for `escrow_id`.
    ///
    /// Must be idempotent on `key`: a second capture with the same key
    /// returns the original reference without charging again.
    async fn capture(
        &self,
        escrow_id: &EscrowId,
        amount: Amount,
        key: &IdempotencyKey,
    ) -> Result<PaymentReference, GatewayError>;
}

/// Pays released or refunded funds out of the trust balance
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    /// Pay `amount` to `party`.
    ///
    /// Must be idempotent on `key`: a second payout with the same key
    /// returns the original transaction id without paying again.
    async fn payout(
        &self,
        party: &PartyId,
        amount: Amount,
        key: &IdempotencyKey,
    ) -> Result<TransactionId, GatewayError>;
}

// =============================================================================
// Notifier
// =============================================================================

/// Events the engine announces to the parties involved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowEvent {
    EscrowFunded,
    MilestoneApproved,
    MilestoneReleased,
    EscrowReleased,
    EscrowRefunded,
    DisputeOpened,
    DisputeEscalated,
    DisputeResolved,
}

/// Outbound alert channel.
///
/// Notification failures never block or reverse a committed escrow
/// transition — the engine logs and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `event` to `party` with an opaque payload
    async fn notify(&self, party: &PartyId, event: EscrowEvent, payload: serde_json::Value);
}
