//! Escrow state machine
//!
//! The `EscrowEngine` executes every account transition as a
//! read-check-write sequence: load the snapshot and its version, guard
//! the transition, run the external money movement under a bounded
//! timeout, then commit through the store's compare-and-swap keyed on the
//! version the caller read. A declined or timed-out gateway call returns
//! before the commit, so the account is never left half-transitioned.
//!
//! The engine holds no state of its own between calls; the store may be
//! shared with other processes, and the CAS is the only writer
//! coordination.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::time::timeout;
use tracing::{info, warn};

use trustline_gateway::{
    EscrowEvent, IdempotencyKey, Notifier, PaymentGateway, PaymentReference, PayoutGateway,
};
use trustline_store::{RecordStore, Version};
use trustline_types::{
    Amount, CreateEscrowRequest, EscrowAccount, EscrowId, EscrowStatus, MilestoneId,
    MilestoneStatus, PartyId, PaymentDetails, Result, TransactionId, TrustlineError,
};

use crate::config::EngineConfig;
use crate::ledger;

/// Which payout contract a gateway decline maps to
#[derive(Debug, Clone, Copy)]
pub(crate) enum PayoutKind {
    Release,
    Refund,
}

/// Fail fast on a stale read before any gateway effect runs.
///
/// The store's compare-and-swap remains the authoritative guard at
/// commit time; this check just spares the gateway a doomed call.
pub(crate) fn ensure_version(id: &EscrowId, current: Version, expected: Version) -> Result<()> {
    if current != expected {
        return Err(TrustlineError::VersionConflict {
            entity: "escrow",
            id: id.to_string(),
            expected: expected.value(),
            actual: current.value(),
        });
    }
    Ok(())
}

/// The escrow state machine.
///
/// All collaborators are injected; the engine owns no process-wide state.
pub struct EscrowEngine {
    pub(crate) accounts: Arc<dyn RecordStore<EscrowId, EscrowAccount>>,
    pub(crate) payments: Arc<dyn PaymentGateway>,
    pub(crate) payouts: Arc<dyn PayoutGateway>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: EngineConfig,
}

impl EscrowEngine {
    pub fn new(
        accounts: Arc<dyn RecordStore<EscrowId, EscrowAccount>>,
        payments: Arc<dyn PaymentGateway>,
        payouts: Arc<dyn PayoutGateway>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            accounts,
            payments,
            payouts,
            notifier,
            config,
        }
    }

    /// Create a new escrow account in `Pending`.
    ///
    /// The platform fee is computed exactly once here and never again.
    pub async fn create(&self, request: CreateEscrowRequest) -> Result<(EscrowAccount, Version)> {
        if !request.principal.is_positive() {
            return Err(TrustlineError::InvalidAmount {
                reason: "principal must be positive".to_string(),
            });
        }

        let fee = self.config.fees.platform_fee(request.principal)?;
        let account = EscrowAccount {
            id: EscrowId::new(),
            order_id: request.order_id,
            buyer: request.buyer,
            seller: request.seller,
            principal: request.principal,
            fee,
            released: Amount::zero(request.principal.currency),
            status: EscrowStatus::Pending,
            milestones: request
                .milestones
                .into_iter()
                .map(|spec| spec.into_milestone())
                .collect(),
            dispute: None,
            created_at: Utc::now(),
        };

        for milestone in &account.milestones {
            if !milestone.amount.is_positive() {
                return Err(TrustlineError::InvalidAmount {
                    reason: format!("milestone {} amount must be positive", milestone.id),
                });
            }
        }
        let total = account.milestones_total()?;
        if total.minor > account.principal.minor {
            return Err(TrustlineError::InvalidAmount {
                reason: format!(
                    "milestone amounts {} exceed principal {}",
                    total, account.principal
                ),
            });
        }

        let version = self
            .accounts
            .commit(&account.id, &account, Version::NONE)
            .await?;
        info!(escrow_id = %account.id, principal = %account.principal, fee = %account.fee, "escrow created");
        Ok((account, version))
    }

    /// Read an account snapshot together with its version
    pub async fn get(&self, escrow_id: &EscrowId) -> Result<(EscrowAccount, Version)> {
        self.load(escrow_id).await
    }

    /// Fund a pending escrow by capturing the buyer's payment.
    ///
    /// The capture runs before the commit: a decline or timeout leaves
    /// the account `Pending` and the operation cleanly retryable.
    pub async fn fund(
        &self,
        escrow_id: &EscrowId,
        expected: Version,
        payment: PaymentDetails,
    ) -> Result<(EscrowAccount, Version)> {
        let (account, current) = self.load(escrow_id).await?;
        ensure_version(escrow_id, current, expected)?;
        if account.status != EscrowStatus::Pending {
            return Err(account.invalid_state("fund"));
        }

        let key = IdempotencyKey::derive(escrow_id, "fund");
        let reference = self
            .capture_bounded(escrow_id, account.principal, &key)
            .await?;

        let mut next = account;
        next.status = EscrowStatus::Funded;
        let version = self.accounts.commit(escrow_id, &next, expected).await?;
        info!(
            %escrow_id,
            %reference,
            instrument = %payment.instrument,
            %version,
            "escrow funded"
        );

        self.notifier
            .notify(
                &next.seller,
                EscrowEvent::EscrowFunded,
                json!({ "escrow_id": escrow_id.to_string(), "amount": next.principal.to_string() }),
            )
            .await;
        Ok((next, version))
    }

    /// Approve a pending milestone.
    ///
    /// Moves the milestone to `Approved` with the supplied evidence and a
    /// `Funded` account to `InProgress`. No money moves.
    pub async fn approve_milestone(
        &self,
        escrow_id: &EscrowId,
        milestone_id: &MilestoneId,
        expected: Version,
        evidence: Vec<String>,
    ) -> Result<(EscrowAccount, Version)> {
        let (account, current) = self.load(escrow_id).await?;
        ensure_version(escrow_id, current, expected)?;
        if !matches!(
            account.status,
            EscrowStatus::Funded | EscrowStatus::InProgress
        ) {
            return Err(account.invalid_state("approve_milestone"));
        }

        let next = ledger::record_approval(&account, milestone_id, evidence, Utc::now())?;
        let version = self.accounts.commit(escrow_id, &next, expected).await?;
        info!(%escrow_id, %milestone_id, %version, "milestone approved");

        self.notifier
            .notify(
                &next.seller,
                EscrowEvent::MilestoneApproved,
                json!({ "escrow_id": escrow_id.to_string(), "milestone_id": milestone_id.to_string() }),
            )
            .await;
        Ok((next, version))
    }

    /// Release an approved milestone's amount to the seller.
    ///
    /// On a gateway decline the milestone stays `Approved` and the call
    /// is retryable; the idempotency key keeps a retry after a timeout
    /// from paying twice. When the last milestone releases, the account
    /// itself moves to `Released`.
    pub async fn release_milestone(
        &self,
        escrow_id: &EscrowId,
        milestone_id: &MilestoneId,
        expected: Version,
    ) -> Result<(EscrowAccount, Version)> {
        let (account, current) = self.load(escrow_id).await?;
        ensure_version(escrow_id, current, expected)?;
        if !matches!(
            account.status,
            EscrowStatus::Funded | EscrowStatus::InProgress
        ) {
            return Err(account.invalid_state("release_milestone"));
        }

        let (next, amount) = ledger::record_release(&account, milestone_id, Utc::now())?;

        let key = IdempotencyKey::derive_for_milestone(escrow_id, "release_milestone", milestone_id);
        let tx = self
            .payout_bounded(
                "release_milestone",
                PayoutKind::Release,
                escrow_id,
                &next.seller,
                amount,
                &key,
            )
            .await?;

        let version = self.accounts.commit(escrow_id, &next, expected).await?;
        info!(%escrow_id, %milestone_id, %amount, %tx, %version, "milestone released");

        self.notifier
            .notify(
                &next.seller,
                EscrowEvent::MilestoneReleased,
                json!({
                    "escrow_id": escrow_id.to_string(),
                    "milestone_id": milestone_id.to_string(),
                    "amount": amount.to_string(),
                }),
            )
            .await;
        if next.status == EscrowStatus::Released {
            self.notify_both(&next, EscrowEvent::EscrowReleased).await;
        }
        Ok((next, version))
    }

    /// Release the full remaining balance to the seller.
    pub async fn release_full(
        &self,
        escrow_id: &EscrowId,
        expected: Version,
        actor: &PartyId,
    ) -> Result<(EscrowAccount, Version)> {
        let (account, current) = self.load(escrow_id).await?;
        ensure_version(escrow_id, current, expected)?;
        if !matches!(
            account.status,
            EscrowStatus::Funded | EscrowStatus::InProgress
        ) {
            return Err(account.invalid_state("release_full"));
        }

        info!(%escrow_id, %actor, "full release requested");
        let key = IdempotencyKey::derive(escrow_id, "release_full");
        self.finish_release(account, expected, key).await
    }

    /// Refund the remaining balance to the buyer.
    ///
    /// Allowed from any non-terminal state. A `Pending` account has
    /// nothing captured yet, so no money moves on that path.
    pub async fn refund(
        &self,
        escrow_id: &EscrowId,
        expected: Version,
        reason: String,
    ) -> Result<(EscrowAccount, Version)> {
        let (account, current) = self.load(escrow_id).await?;
        ensure_version(escrow_id, current, expected)?;
        if account.is_terminal() {
            return Err(account.invalid_state("refund"));
        }

        let key = IdempotencyKey::derive(escrow_id, "refund");
        self.finish_refund(account, expected, key, reason).await
    }

    // ========================================================================
    // Shared transition tails (also driven by dispute resolution)
    // ========================================================================

    /// Pay out the remaining balance and commit the `Released` terminal
    /// state. The account passed in may already carry resolved dispute
    /// fields; they commit in the same compare-and-swap.
    pub(crate) async fn finish_release(
        &self,
        account: EscrowAccount,
        expected: Version,
        key: IdempotencyKey,
    ) -> Result<(EscrowAccount, Version)> {
        let escrow_id = account.id.clone();
        let remaining = account.remaining();

        let tx = self
            .payout_bounded(
                "release_full",
                PayoutKind::Release,
                &escrow_id,
                &account.seller,
                remaining,
                &key,
            )
            .await?;

        let now = Utc::now();
        let mut next = account;
        next.released = next.principal;
        next.status = EscrowStatus::Released;
        next.milestones = next
            .milestones
            .iter()
            .map(|m| {
                let mut m = m.clone();
                if m.status != MilestoneStatus::Released {
                    m.status = MilestoneStatus::Released;
                    m.released_date = Some(now);
                }
                m
            })
            .collect();

        let version = self.accounts.commit(&escrow_id, &next, expected).await?;
        info!(%escrow_id, %remaining, %tx, %version, "escrow released in full");

        self.notify_both(&next, EscrowEvent::EscrowReleased).await;
        Ok((next, version))
    }

    /// Refund the remaining balance and commit the `Refunded` terminal
    /// state. `released` is left exactly where it was.
    pub(crate) async fn finish_refund(
        &self,
        account: EscrowAccount,
        expected: Version,
        key: IdempotencyKey,
        reason: String,
    ) -> Result<(EscrowAccount, Version)> {
        let escrow_id = account.id.clone();
        let remaining = account.remaining();

        if account.status != EscrowStatus::Pending && remaining.is_positive() {
            let tx = self
                .payout_bounded(
                    "refund",
                    PayoutKind::Refund,
                    &escrow_id,
                    &account.buyer,
                    remaining,
                    &key,
                )
                .await?;
            info!(%escrow_id, %remaining, %tx, "refund paid out");
        }

        let mut next = account;
        next.status = EscrowStatus::Refunded;
        let version = self.accounts.commit(&escrow_id, &next, expected).await?;
        warn!(%escrow_id, %reason, %version, "escrow refunded");

        self.notifier
            .notify(
                &next.buyer,
                EscrowEvent::EscrowRefunded,
                json!({
                    "escrow_id": escrow_id.to_string(),
                    "amount": remaining.to_string(),
                    "reason": reason,
                }),
            )
            .await;
        Ok((next, version))
    }

    /// Pay out a bounded partial amount to the seller and commit the
    /// account back to `InProgress`.
    pub(crate) async fn finish_partial_release(
        &self,
        account: EscrowAccount,
        expected: Version,
        key: IdempotencyKey,
        amount: Amount,
    ) -> Result<(EscrowAccount, Version)> {
        let escrow_id = account.id.clone();
        let next = ledger::record_partial_release(&account, amount)?;

        let tx = self
            .payout_bounded(
                "partial_release",
                PayoutKind::Release,
                &escrow_id,
                &next.seller,
                amount,
                &key,
            )
            .await?;

        let version = self.accounts.commit(&escrow_id, &next, expected).await?;
        info!(%escrow_id, %amount, %tx, %version, "partial release paid out");
        Ok((next, version))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    pub(crate) async fn load(&self, escrow_id: &EscrowId) -> Result<(EscrowAccount, Version)> {
        let loaded = self.accounts.get(escrow_id).await.map_err(TrustlineError::from)?;
        loaded.ok_or_else(|| TrustlineError::EscrowNotFound {
            escrow_id: escrow_id.to_string(),
        })
    }

    async fn capture_bounded(
        &self,
        escrow_id: &EscrowId,
        amount: Amount,
        key: &IdempotencyKey,
    ) -> Result<PaymentReference> {
        match timeout(
            self.config.gateway_timeout,
            self.payments.capture(escrow_id, amount, key),
        )
        .await
        {
            Err(_) => {
                warn!(%escrow_id, %key, "payment capture timed out");
                Err(TrustlineError::GatewayTimeout {
                    operation: "fund",
                    escrow_id: escrow_id.to_string(),
                })
            }
            Ok(Err(e)) => {
                warn!(%escrow_id, error = %e, "payment capture declined");
                Err(TrustlineError::PaymentFailed {
                    escrow_id: escrow_id.to_string(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(reference)) => Ok(reference),
        }
    }

    pub(crate) async fn payout_bounded(
        &self,
        operation: &'static str,
        kind: PayoutKind,
        escrow_id: &EscrowId,
        party: &PartyId,
        amount: Amount,
        key: &IdempotencyKey,
    ) -> Result<TransactionId> {
        match timeout(
            self.config.gateway_timeout,
            self.payouts.payout(party, amount, key),
        )
        .await
        {
            Err(_) => {
                warn!(%escrow_id, %operation, %key, "payout timed out");
                Err(TrustlineError::GatewayTimeout {
                    operation,
                    escrow_id: escrow_id.to_string(),
                })
            }
            Ok(Err(e)) => {
                warn!(%escrow_id, %operation, error = %e, "payout declined");
                Err(match kind {
                    PayoutKind::Release => TrustlineError::PayoutFailed {
                        escrow_id: escrow_id.to_string(),
                        reason: e.to_string(),
                    },
                    PayoutKind::Refund => TrustlineError::RefundFailed {
                        escrow_id: escrow_id.to_string(),
                        reason: e.to_string(),
                    },
                })
            }
            Ok(Ok(tx)) => Ok(tx),
        }
    }

    pub(crate) async fn notify_both(&self, account: &EscrowAccount, event: EscrowEvent) {
        let payload = json!({ "escrow_id": account.id.to_string() });
        self.notifier
            .notify(&account.buyer, event, payload.clone())
            .await;
        self.notifier.notify(&account.seller, event, payload).await;
    }
}
