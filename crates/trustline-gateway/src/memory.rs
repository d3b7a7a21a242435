//! In-memory adapter doubles for tests, demos, and single-process runs.
//!
//! The payment and payout doubles honor the idempotency contract: a
//! repeated call with a seen key returns the original result without
//! recording a second movement. Both can be scripted to decline or to
//! hang, which is how the engine's timeout path is exercised.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use trustline_types::{Amount, EscrowId, PartyId, TransactionId};

use crate::{
    EscrowEvent, GatewayError, IdempotencyKey, Notifier, PaymentGateway, PaymentReference,
    PayoutGateway,
};

/// Scripted behavior for the in-memory gateways
#[derive(Debug, Clone, Default)]
enum Mode {
    #[default]
    Normal,
    Decline(String),
    Hang,
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// In-memory payment capture double
#[derive(Default)]
pub struct MemoryPaymentGateway {
    captures: RwLock<HashMap<IdempotencyKey, PaymentReference>>,
    mode: RwLock<Mode>,
}

impl MemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent capture decline with `reason`
    pub async fn decline_with(&self, reason: &str) {
        *self.mode.write().await = Mode::Decline(reason.to_string());
    }

    /// Make every subsequent capture hang until cancelled
    pub async fn hang(&self) {
        *self.mode.write().await = Mode::Hang;
    }

    /// Restore normal behavior
    pub async fn restore(&self) {
        *self.mode.write().await = Mode::Normal;
    }

    /// Number of distinct captures recorded
    pub async fn capture_count(&self) -> usize {
        self.captures.read().await.len()
    }
}

#[async_trait]
impl PaymentGateway for MemoryPaymentGateway {
    async fn capture(
        &self,
        escrow_id: &EscrowId,
        amount: Amount,
        key: &IdempotencyKey,
    ) -> Result<PaymentReference, GatewayError> {
        match self.mode.read().await.clone() {
            Mode::Decline(reason) => return Err(GatewayError::Declined { reason }),
            Mode::Hang => std::future::pending().await,
            Mode::Normal => {}
        }

        let mut captures = self.captures.write().await;
        if let Some(existing) = captures.get(key) {
            return Ok(existing.clone());
        }

        let reference = PaymentReference(format!("cap_{}", reference_suffix(key)));
        captures.insert(key.clone(), reference.clone());
        info!(%escrow_id, %amount, %key, "payment captured");
        Ok(reference)
    }
}

// =============================================================================
// Payout Gateway
// =============================================================================

/// In-memory payout double tracking per-party totals
#[derive(Default)]
pub struct MemoryPayoutGateway {
    payouts: RwLock<HashMap<IdempotencyKey, TransactionId>>,
    paid: RwLock<Vec<(PartyId, Amount)>>,
    mode: RwLock<Mode>,
}

impl MemoryPayoutGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent payout decline with `reason`
    pub async fn decline_with(&self, reason: &str) {
        *self.mode.write().await = Mode::Decline(reason.to_string());
    }

    /// Make every subsequent payout hang until cancelled
    pub async fn hang(&self) {
        *self.mode.write().await = Mode::Hang;
    }

    /// Restore normal behavior
    pub async fn restore(&self) {
        *self.mode.write().await = Mode::Normal;
    }

    /// Number of distinct payouts recorded
    pub async fn payout_count(&self) -> usize {
        self.payouts.read().await.len()
    }

    /// Total amount paid to `party` across all payouts
    pub async fn total_paid(&self, party: &PartyId, currency: trustline_types::Currency) -> Amount {
        let paid = self.paid.read().await;
        let mut total = Amount::zero(currency);
        for (p, amount) in paid.iter() {
            if p == party {
                total = total.checked_add(*amount).expect("test totals overflow");
            }
        }
        total
    }
}

#[async_trait]
impl PayoutGateway for MemoryPayoutGateway {
    async fn payout(
        &self,
        party: &PartyId,
        amount: Amount,
        key: &IdempotencyKey,
    ) -> Result<TransactionId, GatewayError> {
        match self.mode.read().await.clone() {
            Mode::Decline(reason) => return Err(GatewayError::Declined { reason }),
            Mode::Hang => std::future::pending().await,
            Mode::Normal => {}
        }

        let mut payouts = self.payouts.write().await;
        if let Some(existing) = payouts.get(key) {
            return Ok(existing.clone());
        }

        let tx = TransactionId::new();
        payouts.insert(key.clone(), tx.clone());
        self.paid.write().await.push((party.clone(), amount));
        info!(%party, %amount, %key, "payout executed");
        Ok(tx)
    }
}

// =============================================================================
// Notifiers
// =============================================================================

/// In-memory notifier recording delivered events
#[derive(Default)]
pub struct MemoryNotifier {
    events: RwLock<Vec<(PartyId, EscrowEvent)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered so far, in order
    pub async fn events(&self) -> Vec<(PartyId, EscrowEvent)> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, party: &PartyId, event: EscrowEvent, _payload: serde_json::Value) {
        self.events.write().await.push((party.clone(), event));
    }
}

/// Notifier that drops everything
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _party: &PartyId, _event: EscrowEvent, _payload: serde_json::Value) {}
}

fn reference_suffix(key: &IdempotencyKey) -> String {
    key.as_str().chars().rev().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustline_types::Currency;

    #[tokio::test]
    async fn test_capture_is_idempotent_by_key() {
        let gateway = MemoryPaymentGateway::new();
        let escrow = EscrowId::new();
        let key = IdempotencyKey::derive(&escrow, "fund");
        let amount = Amount::major(100, Currency::USD);

        let first = gateway.capture(&escrow, amount, &key).await.unwrap();
        let second = gateway.capture(&escrow, amount, &key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.capture_count().await, 1);
    }

    #[tokio::test]
    async fn test_payout_is_idempotent_by_key() {
        let gateway = MemoryPayoutGateway::new();
        let escrow = EscrowId::new();
        let party = PartyId::new();
        let key = IdempotencyKey::derive(&escrow, "release_full");
        let amount = Amount::major(250, Currency::USD);

        let first = gateway.payout(&party, amount, &key).await.unwrap();
        let second = gateway.payout(&party, amount, &key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.payout_count().await, 1);
        assert_eq!(gateway.total_paid(&party, Currency::USD).await, amount);
    }

    #[tokio::test]
    async fn test_scripted_decline() {
        let gateway = MemoryPayoutGateway::new();
        gateway.decline_with("insufficient trust balance").await;

        let err = gateway
            .payout(
                &PartyId::new(),
                Amount::major(10, Currency::USD),
                &IdempotencyKey::derive(&EscrowId::new(), "release_full"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Declined { .. }));
        assert_eq!(gateway.payout_count().await, 0);
    }

    #[tokio::test]
    async fn test_memory_notifier_records_events() {
        let notifier = MemoryNotifier::new();
        let party = PartyId::new();

        notifier
            .notify(&party, EscrowEvent::EscrowFunded, serde_json::json!({}))
            .await;

        let events = notifier.events().await;
        assert_eq!(events, vec![(party, EscrowEvent::EscrowFunded)]);
    }
}
