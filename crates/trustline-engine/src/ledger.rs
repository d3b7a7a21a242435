//! Milestone ledger
//!
//! Pure accounting over an `EscrowAccount` snapshot: per-milestone status
//! and the running released total form one consistency boundary. Nothing
//! here performs I/O — the engine sequences these functions between the
//! store read and the compare-and-swap commit, so the invariant checks
//! always run against the exact snapshot being committed.
//!
//! Every function returns a new account value; milestone sequences are
//! rebuilt, never spliced in place.

use chrono::{DateTime, Utc};
use thiserror::Error;

use trustline_types::{
    Amount, EscrowAccount, EscrowStatus, Milestone, MilestoneId, MilestoneStatus, TrustlineError,
};

/// Failures from milestone accounting
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("milestone {milestone_id} not found in escrow {escrow_id}")]
    MilestoneNotFound {
        escrow_id: String,
        milestone_id: String,
    },

    #[error("milestone {milestone_id} cannot {operation} from status {status}")]
    InvalidMilestoneState {
        milestone_id: String,
        status: String,
        operation: &'static str,
    },

    #[error("release of {requested} exceeds remaining {remaining} on escrow {escrow_id}")]
    AmountOverrun {
        escrow_id: String,
        requested: Amount,
        remaining: Amount,
    },
}

impl From<LedgerError> for TrustlineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::MilestoneNotFound {
                escrow_id,
                milestone_id,
            } => TrustlineError::MilestoneNotFound {
                escrow_id,
                milestone_id,
            },
            LedgerError::InvalidMilestoneState {
                milestone_id,
                status,
                operation,
            } => TrustlineError::InvalidMilestoneState {
                milestone_id,
                status,
                operation,
            },
            LedgerError::AmountOverrun {
                escrow_id,
                requested,
                remaining,
            } => TrustlineError::AmountOverrun {
                escrow_id,
                requested,
                remaining,
            },
        }
    }
}

/// Funds still held in trust for this account
pub fn remaining_amount(account: &EscrowAccount) -> Amount {
    account.remaining()
}

/// Record a milestone approval.
///
/// The milestone moves Pending -> Approved with `completed_date` and the
/// supplied evidence; a Funded account moves to InProgress.
pub fn record_approval(
    account: &EscrowAccount,
    milestone_id: &MilestoneId,
    evidence: Vec<String>,
    now: DateTime<Utc>,
) -> Result<EscrowAccount, LedgerError> {
    let milestone = require_milestone(account, milestone_id)?;
    if milestone.status != MilestoneStatus::Pending {
        return Err(invalid_state(milestone, "approve"));
    }

    let mut next = account.clone();
    next.milestones = rebuild(account, milestone_id, |m| {
        m.status = MilestoneStatus::Approved;
        m.completed_date = Some(now);
        m.evidence = evidence.clone();
    });
    if next.status == EscrowStatus::Funded {
        next.status = EscrowStatus::InProgress;
    }
    Ok(next)
}

/// Record a milestone release.
///
/// The milestone moves Approved -> Released, the released total grows by
/// the milestone amount, and when every milestone is released the account
/// itself moves to Released. Returns the new account and the amount to
/// pay out.
pub fn record_release(
    account: &EscrowAccount,
    milestone_id: &MilestoneId,
    now: DateTime<Utc>,
) -> Result<(EscrowAccount, Amount), LedgerError> {
    let milestone = require_milestone(account, milestone_id)?;
    if milestone.status != MilestoneStatus::Approved {
        return Err(invalid_state(milestone, "release"));
    }

    let amount = milestone.amount;
    let released = checked_release_total(account, amount)?;

    let mut next = account.clone();
    next.milestones = rebuild(account, milestone_id, |m| {
        m.status = MilestoneStatus::Released;
        m.released_date = Some(now);
    });
    next.released = released;
    next.status = if next.all_milestones_released() {
        EscrowStatus::Released
    } else {
        EscrowStatus::InProgress
    };
    Ok((next, amount))
}

/// Record a bounded partial release decided by dispute resolution.
///
/// The released total grows by `amount` and the account returns to
/// InProgress; milestone statuses are the resolution's concern, not the
/// ledger's.
pub fn record_partial_release(
    account: &EscrowAccount,
    amount: Amount,
) -> Result<EscrowAccount, LedgerError> {
    let released = checked_release_total(account, amount)?;

    let mut next = account.clone();
    next.released = released;
    next.status = EscrowStatus::InProgress;
    Ok(next)
}

fn require_milestone<'a>(
    account: &'a EscrowAccount,
    milestone_id: &MilestoneId,
) -> Result<&'a Milestone, LedgerError> {
    account
        .milestone(milestone_id)
        .ok_or_else(|| LedgerError::MilestoneNotFound {
            escrow_id: account.id.to_string(),
            milestone_id: milestone_id.to_string(),
        })
}

fn invalid_state(milestone: &Milestone, operation: &'static str) -> LedgerError {
    LedgerError::InvalidMilestoneState {
        milestone_id: milestone.id.to_string(),
        status: milestone.status.name().to_string(),
        operation,
    }
}

/// The released total after adding `amount`, or `AmountOverrun` if it
/// would pass the principal by even one minor unit.
fn checked_release_total(
    account: &EscrowAccount,
    amount: Amount,
) -> Result<Amount, LedgerError> {
    let remaining = account.remaining();
    if !amount.is_positive() || amount.minor > remaining.minor {
        return Err(LedgerError::AmountOverrun {
            escrow_id: account.id.to_string(),
            requested: amount,
            remaining,
        });
    }
    Ok(Amount::from_minor(
        account.released.minor + amount.minor,
        account.principal.currency,
    ))
}

fn rebuild(
    account: &EscrowAccount,
    milestone_id: &MilestoneId,
    update: impl Fn(&mut Milestone),
) -> Vec<Milestone> {
    account
        .milestones
        .iter()
        .map(|m| {
            let mut m = m.clone();
            if &m.id == milestone_id {
                update(&mut m);
            }
            m
        })
        .collect()
}
