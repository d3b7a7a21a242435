//! Dispute coordination
//!
//! A dispute is owned by its escrow account and committed under the
//! account's version, so opening, triaging, and resolving a dispute all
//! ride the same compare-and-swap as the funds they affect. A write-once
//! index maps `DisputeId` to the owning account for lookup.
//!
//! Resolution delegates the money movement back into the
//! [`EscrowEngine`]; the dispute is only marked `Resolved` in the same
//! commit that applies the escrow transition. If the underlying payout
//! or refund fails, nothing commits and the dispute stays where it was —
//! retryable without double-charging or double-resolving.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use trustline_gateway::{EscrowEvent, IdempotencyKey};
use trustline_store::{RecordStore, Version};
use trustline_types::{
    Amount, Dispute, DisputeId, DisputeParty, DisputeResolution, DisputeStatus, EscrowAccount,
    EscrowId, EscrowStatus, MilestoneStatus, Result, TrustlineError,
};

use crate::escrow::{ensure_version, EscrowEngine};

/// Coordinates the dispute lifecycle for escrow accounts
pub struct DisputeCoordinator {
    engine: Arc<EscrowEngine>,
    index: Arc<dyn RecordStore<DisputeId, EscrowId>>,
}

impl DisputeCoordinator {
    pub fn new(
        engine: Arc<EscrowEngine>,
        index: Arc<dyn RecordStore<DisputeId, EscrowId>>,
    ) -> Self {
        Self { engine, index }
    }

    /// File a dispute against a funded or in-progress escrow.
    ///
    /// The account moves to `Disputed` and its unreleased milestones
    /// freeze, all under the version the caller read. The counterparty
    /// is notified after the commit.
    pub async fn open_dispute(
        &self,
        escrow_id: &EscrowId,
        expected: Version,
        initiator: DisputeParty,
        reason: String,
        details: String,
        evidence: Vec<String>,
    ) -> Result<(EscrowAccount, Version)> {
        let (account, current) = self.engine.load(escrow_id).await?;
        ensure_version(escrow_id, current, expected)?;
        if !account.status.can_dispute() {
            return Err(account.invalid_state("open_dispute"));
        }

        let dispute = Dispute::open(
            escrow_id.clone(),
            initiator,
            reason,
            details,
            evidence,
        );
        let dispute_id = dispute.id.clone();

        let mut next = account;
        next.status = EscrowStatus::Disputed;
        next.milestones = next
            .milestones
            .iter()
            .map(|m| {
                let mut m = m.clone();
                if m.status != MilestoneStatus::Released {
                    m.status = MilestoneStatus::Disputed;
                }
                m
            })
            .collect();
        next.dispute = Some(dispute);

        let version = self.engine.accounts.commit(escrow_id, &next, expected).await?;
        self.index
            .commit(&dispute_id, escrow_id, Version::NONE)
            .await?;
        warn!(%escrow_id, %dispute_id, ?initiator, %version, "dispute opened");

        let counterparty = match initiator {
            DisputeParty::Buyer => &next.seller,
            DisputeParty::Seller => &next.buyer,
        };
        self.engine
            .notifier
            .notify(
                counterparty,
                EscrowEvent::DisputeOpened,
                json!({ "escrow_id": escrow_id.to_string(), "dispute_id": dispute_id.to_string() }),
            )
            .await;
        Ok((next, version))
    }

    /// Move an open dispute into active investigation
    pub async fn start_investigation(
        &self,
        dispute_id: &DisputeId,
        expected: Version,
    ) -> Result<(EscrowAccount, Version)> {
        let (escrow_id, account, current, dispute) = self.lookup(dispute_id).await?;
        ensure_version(&escrow_id, current, expected)?;
        if dispute.status != DisputeStatus::Open {
            return Err(invalid_dispute_state(&dispute, "start_investigation"));
        }

        let next = with_dispute(&account, |d| d.status = DisputeStatus::Investigating);
        let version = self.engine.accounts.commit(&escrow_id, &next, expected).await?;
        info!(%escrow_id, %dispute_id, %version, "dispute under investigation");
        Ok((next, version))
    }

    /// Hand the dispute to manual takeover.
    ///
    /// The account stays `Disputed`; no further coordinator-driven
    /// transitions apply.
    pub async fn escalate(
        &self,
        dispute_id: &DisputeId,
        expected: Version,
        notes: String,
    ) -> Result<(EscrowAccount, Version)> {
        let (escrow_id, account, current, dispute) = self.lookup(dispute_id).await?;
        ensure_version(&escrow_id, current, expected)?;
        if !dispute.status.is_resolvable() {
            return Err(invalid_dispute_state(&dispute, "escalate"));
        }

        let next = with_dispute(&account, |d| {
            d.status = DisputeStatus::Escalated;
            d.resolution_notes = Some(notes.clone());
        });
        let version = self.engine.accounts.commit(&escrow_id, &next, expected).await?;
        warn!(%escrow_id, %dispute_id, %version, "dispute escalated to manual takeover");

        self.engine
            .notify_both(&next, EscrowEvent::DisputeEscalated)
            .await;
        Ok((next, version))
    }

    /// Close a dispute with a resolution action.
    ///
    /// `partial_amount` is required for `PartialRelease` and must not
    /// exceed the remaining principal.
    pub async fn resolve(
        &self,
        dispute_id: &DisputeId,
        expected: Version,
        resolution: DisputeResolution,
        partial_amount: Option<Amount>,
        notes: String,
    ) -> Result<(EscrowAccount, Version)> {
        let (escrow_id, account, current, dispute) = self.lookup(dispute_id).await?;
        ensure_version(&escrow_id, current, expected)?;
        if !dispute.status.is_resolvable() {
            return Err(invalid_dispute_state(&dispute, "resolve"));
        }

        let now = Utc::now();
        let resolved = with_dispute(&account, |d| {
            d.status = DisputeStatus::Resolved;
            d.resolution = Some(resolution);
            d.resolution_notes = Some(notes.clone());
            d.resolved_at = Some(now);
        });

        let (next, version) = match resolution {
            DisputeResolution::ReleaseToSeller => {
                let key =
                    IdempotencyKey::derive_for_dispute(&escrow_id, "dispute_release", dispute_id);
                self.engine.finish_release(resolved, expected, key).await?
            }
            DisputeResolution::RefundToBuyer => {
                let key =
                    IdempotencyKey::derive_for_dispute(&escrow_id, "dispute_refund", dispute_id);
                self.engine
                    .finish_refund(resolved, expected, key, notes.clone())
                    .await?
            }
            DisputeResolution::PartialRelease => {
                let amount = self.partial_amount(dispute_id, &account, partial_amount)?;
                let key =
                    IdempotencyKey::derive_for_dispute(&escrow_id, "dispute_partial", dispute_id);
                // Unfreeze the milestones the dispute suspended; work
                // continues on the remainder, approvals start over.
                let unfrozen = unfreeze_milestones(resolved);
                self.engine
                    .finish_partial_release(unfrozen, expected, key, amount)
                    .await?
            }
        };

        info!(%escrow_id, %dispute_id, ?resolution, %version, "dispute resolved");
        self.engine
            .notify_both(&next, EscrowEvent::DisputeResolved)
            .await;
        Ok((next, version))
    }

    /// Read the owning account for a dispute
    pub async fn get(&self, dispute_id: &DisputeId) -> Result<(EscrowAccount, Version)> {
        let (_, account, version, _) = self.lookup(dispute_id).await?;
        Ok((account, version))
    }

    async fn lookup(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<(EscrowId, EscrowAccount, Version, Dispute)> {
        let not_found = || TrustlineError::DisputeNotFound {
            dispute_id: dispute_id.to_string(),
        };

        let (escrow_id, _) = self
            .index
            .get(dispute_id)
            .await
            .map_err(TrustlineError::from)?
            .ok_or_else(not_found)?;
        let (account, version) = self.engine.load(&escrow_id).await?;

        // A later dispute may have replaced this one on the account;
        // only the account's current dispute is actionable.
        let dispute = match &account.dispute {
            Some(d) if &d.id == dispute_id => d.clone(),
            _ => return Err(not_found()),
        };
        Ok((escrow_id, account, version, dispute))
    }

    fn partial_amount(
        &self,
        dispute_id: &DisputeId,
        account: &EscrowAccount,
        partial_amount: Option<Amount>,
    ) -> Result<Amount> {
        let amount = partial_amount.ok_or_else(|| TrustlineError::InvalidResolution {
            dispute_id: dispute_id.to_string(),
            reason: "partial release requires an amount".to_string(),
        })?;
        let remaining = account.remaining();
        if amount.currency != remaining.currency {
            return Err(TrustlineError::InvalidResolution {
                dispute_id: dispute_id.to_string(),
                reason: format!(
                    "partial amount currency {} does not match escrow currency {}",
                    amount.currency, remaining.currency
                ),
            });
        }
        if !amount.is_positive() || amount.minor > remaining.minor {
            return Err(TrustlineError::InvalidResolution {
                dispute_id: dispute_id.to_string(),
                reason: format!("partial amount {} exceeds remaining {}", amount, remaining),
            });
        }
        Ok(amount)
    }
}

fn with_dispute(account: &EscrowAccount, update: impl FnOnce(&mut Dispute)) -> EscrowAccount {
    let mut next = account.clone();
    if let Some(dispute) = next.dispute.as_mut() {
        update(dispute);
    }
    next
}

fn unfreeze_milestones(mut account: EscrowAccount) -> EscrowAccount {
    account.milestones = account
        .milestones
        .iter()
        .map(|m| {
            let mut m = m.clone();
            if m.status == MilestoneStatus::Disputed {
                m.status = MilestoneStatus::Pending;
                m.completed_date = None;
            }
            m
        })
        .collect();
    account
}

fn invalid_dispute_state(dispute: &Dispute, operation: &'static str) -> TrustlineError {
    TrustlineError::InvalidDisputeState {
        dispute_id: dispute.id.to_string(),
        status: dispute.status.name().to_string(),
        operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::time::Duration;
    use trustline_gateway::{MemoryNotifier, MemoryPaymentGateway, MemoryPayoutGateway};
    use trustline_store::MemoryStore;
    use trustline_types::{CreateEscrowRequest, Currency, OrderId, PartyId, PaymentDetails};

    struct Harness {
        engine: Arc<EscrowEngine>,
        coordinator: DisputeCoordinator,
        payouts: Arc<MemoryPayoutGateway>,
    }

    fn harness() -> Harness {
        let payouts = Arc::new(MemoryPayoutGateway::new());
        let engine = Arc::new(EscrowEngine::new(
            Arc::new(MemoryStore::new("escrow")),
            Arc::new(MemoryPaymentGateway::new()),
            payouts.clone(),
            Arc::new(MemoryNotifier::new()),
            EngineConfig {
                gateway_timeout: Duration::from_millis(100),
                ..EngineConfig::default()
            },
        ));
        let coordinator = DisputeCoordinator::new(
            engine.clone(),
            Arc::new(MemoryStore::new("dispute_index")),
        );
        Harness {
            engine,
            coordinator,
            payouts,
        }
    }

    async fn funded_escrow(h: &Harness, major: i128) -> (EscrowAccount, Version) {
        let (account, v1) = h
            .engine
            .create(CreateEscrowRequest {
                order_id: OrderId::new(),
                buyer: PartyId::new(),
                seller: PartyId::new(),
                principal: Amount::major(major, Currency::USD),
                milestones: vec![],
            })
            .await
            .unwrap();
        h.engine
            .fund(
                &account.id,
                v1,
                PaymentDetails {
                    instrument: "card_tok_1".to_string(),
                    metadata: json!({}),
                },
            )
            .await
            .unwrap()
    }

    async fn open(h: &Harness, account: &EscrowAccount, version: Version) -> (EscrowAccount, Version) {
        h.coordinator
            .open_dispute(
                &account.id,
                version,
                DisputeParty::Buyer,
                "undelivered".to_string(),
                "nothing arrived".to_string(),
                vec![],
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_dispute_forces_disputed_state() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;

        let (disputed, v) = open(&h, &account, version).await;
        assert_eq!(disputed.status, EscrowStatus::Disputed);
        assert_eq!(v, version.next());
        let dispute = disputed.dispute.as_ref().unwrap();
        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.escrow_id, account.id);
    }

    #[tokio::test]
    async fn test_dispute_exclusivity() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (_, v2) = open(&h, &account, version).await;

        let err = h
            .coordinator
            .open_dispute(
                &account.id,
                v2,
                DisputeParty::Seller,
                "counter".to_string(),
                String::new(),
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_cannot_dispute_pending_escrow() {
        let h = harness();
        let (account, v1) = h
            .engine
            .create(CreateEscrowRequest {
                order_id: OrderId::new(),
                buyer: PartyId::new(),
                seller: PartyId::new(),
                principal: Amount::major(100, Currency::USD),
                milestones: vec![],
            })
            .await
            .unwrap();

        let err = h
            .coordinator
            .open_dispute(
                &account.id,
                v1,
                DisputeParty::Buyer,
                "early".to_string(),
                String::new(),
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_resolve_refund_to_buyer() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (disputed, v) = open(&h, &account, version).await;
        let dispute_id = disputed.dispute.as_ref().unwrap().id.clone();

        let (resolved, _) = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::RefundToBuyer,
                None,
                "buyer favored".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, EscrowStatus::Refunded);
        assert!(resolved.released.is_zero());
        let dispute = resolved.dispute.as_ref().unwrap();
        assert_eq!(dispute.status, DisputeStatus::Resolved);
        assert_eq!(dispute.resolution, Some(DisputeResolution::RefundToBuyer));
        assert!(dispute.resolved_at.is_some());
        assert_eq!(
            h.payouts.total_paid(&account.buyer, Currency::USD).await,
            Amount::major(500, Currency::USD)
        );
    }

    #[tokio::test]
    async fn test_resolve_release_to_seller() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (disputed, v) = open(&h, &account, version).await;
        let dispute_id = disputed.dispute.as_ref().unwrap().id.clone();

        let (resolved, _) = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::ReleaseToSeller,
                None,
                "seller delivered".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, EscrowStatus::Released);
        assert_eq!(resolved.released, resolved.principal);
        assert_eq!(
            h.payouts.total_paid(&account.seller, Currency::USD).await,
            Amount::major(500, Currency::USD)
        );
    }

    #[tokio::test]
    async fn test_partial_release_requires_valid_amount() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (disputed, v) = open(&h, &account, version).await;
        let dispute_id = disputed.dispute.as_ref().unwrap().id.clone();

        let err = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::PartialRelease,
                None,
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::InvalidResolution { .. }));

        let err = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::PartialRelease,
                Some(Amount::major(600, Currency::USD)),
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::InvalidResolution { .. }));
    }

    #[tokio::test]
    async fn test_partial_release_returns_to_in_progress() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (disputed, v) = open(&h, &account, version).await;
        let dispute_id = disputed.dispute.as_ref().unwrap().id.clone();

        let (resolved, _) = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::PartialRelease,
                Some(Amount::major(200, Currency::USD)),
                "split".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, EscrowStatus::InProgress);
        assert_eq!(resolved.released, Amount::major(200, Currency::USD));
        assert_eq!(resolved.remaining(), Amount::major(300, Currency::USD));
        assert_eq!(
            resolved.dispute.as_ref().unwrap().status,
            DisputeStatus::Resolved
        );
    }

    #[tokio::test]
    async fn test_failed_payout_leaves_dispute_open() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (disputed, v) = open(&h, &account, version).await;
        let dispute_id = disputed.dispute.as_ref().unwrap().id.clone();

        h.payouts.decline_with("account frozen").await;
        let err = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::ReleaseToSeller,
                None,
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::PayoutFailed { .. }));

        // Nothing committed: the dispute is still open, funds untouched
        let (reloaded, rv) = h.coordinator.get(&dispute_id).await.unwrap();
        assert_eq!(rv, v);
        assert_eq!(reloaded.status, EscrowStatus::Disputed);
        assert_eq!(
            reloaded.dispute.as_ref().unwrap().status,
            DisputeStatus::Open
        );

        // And the same call succeeds once the gateway recovers
        h.payouts.restore().await;
        let (resolved, _) = h
            .coordinator
            .resolve(
                &dispute_id,
                v,
                DisputeResolution::ReleaseToSeller,
                None,
                String::new(),
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, EscrowStatus::Released);
    }

    #[tokio::test]
    async fn test_investigation_and_escalation() {
        let h = harness();
        let (account, version) = funded_escrow(&h, 500).await;
        let (disputed, v) = open(&h, &account, version).await;
        let dispute_id = disputed.dispute.as_ref().unwrap().id.clone();

        let (next, v2) = h
            .coordinator
            .start_investigation(&dispute_id, v)
            .await
            .unwrap();
        assert_eq!(
            next.dispute.as_ref().unwrap().status,
            DisputeStatus::Investigating
        );

        let (next, v3) = h
            .coordinator
            .escalate(&dispute_id, v2, "needs legal".to_string())
            .await
            .unwrap();
        assert_eq!(
            next.dispute.as_ref().unwrap().status,
            DisputeStatus::Escalated
        );

        // Escalation exits automated resolution
        let err = h
            .coordinator
            .resolve(
                &dispute_id,
                v3,
                DisputeResolution::RefundToBuyer,
                None,
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::InvalidDisputeState { .. }));
    }

    #[tokio::test]
    async fn test_unknown_dispute() {
        let h = harness();
        let err = h
            .coordinator
            .resolve(
                &DisputeId::new(),
                Version::new(1),
                DisputeResolution::RefundToBuyer,
                None,
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustlineError::DisputeNotFound { .. }));
    }
}
