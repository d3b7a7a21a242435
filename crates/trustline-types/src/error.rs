//! Error types for Trustline
//!
//! Every failure is explicit and carries enough context (entity ids,
//! expected/actual versions) for the caller to decide between retry,
//! escalation, and user-facing messaging. Nothing is retried internally.

use crate::Amount;
use thiserror::Error;

/// Result type for Trustline operations
pub type Result<T> = std::result::Result<T, TrustlineError>;

/// Trustline error taxonomy
#[derive(Debug, Clone, Error)]
pub enum TrustlineError {
    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// Escrow account not found
    #[error("Escrow {escrow_id} not found")]
    EscrowNotFound { escrow_id: String },

    /// Milestone not found within its owning account
    #[error("Milestone {milestone_id} not found in escrow {escrow_id}")]
    MilestoneNotFound {
        escrow_id: String,
        milestone_id: String,
    },

    /// Dispute not found
    #[error("Dispute {dispute_id} not found")]
    DisputeNotFound { dispute_id: String },

    // ========================================================================
    // State Errors
    // ========================================================================

    /// The requested transition is illegal from the account's current state
    #[error("Escrow {escrow_id} cannot {operation} from state {state}")]
    InvalidState {
        escrow_id: String,
        state: String,
        operation: &'static str,
    },

    /// The requested transition is illegal from the milestone's current status
    #[error("Milestone {milestone_id} cannot {operation} from status {status}")]
    InvalidMilestoneState {
        milestone_id: String,
        status: String,
        operation: &'static str,
    },

    /// The requested transition is illegal from the dispute's current status
    #[error("Dispute {dispute_id} cannot {operation} from status {status}")]
    InvalidDisputeState {
        dispute_id: String,
        status: String,
        operation: &'static str,
    },

    /// A dispute resolution request is malformed
    #[error("Invalid resolution for dispute {dispute_id}: {reason}")]
    InvalidResolution { dispute_id: String, reason: String },

    // ========================================================================
    // Concurrency Errors
    // ========================================================================

    /// Optimistic lock mismatch — re-read, recompute, resubmit
    #[error("Version conflict on {entity} {id}: expected v{expected}, actual v{actual}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    // ========================================================================
    // Amount Errors
    // ========================================================================

    /// A release or refund would push the released total past the principal
    #[error("Release of {requested} exceeds remaining {remaining} on escrow {escrow_id}")]
    AmountOverrun {
        escrow_id: String,
        requested: Amount,
        remaining: Amount,
    },

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Currency mismatch
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid amount supplied by the caller
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // ========================================================================
    // Gateway Errors
    // ========================================================================

    /// The adapter did not respond in time — outcome unknown, check before retrying
    #[error("Gateway timeout during {operation} on escrow {escrow_id}")]
    GatewayTimeout {
        operation: &'static str,
        escrow_id: String,
    },

    /// The payment gateway explicitly declined a capture
    #[error("Payment capture failed for escrow {escrow_id}: {reason}")]
    PaymentFailed { escrow_id: String, reason: String },

    /// The payout gateway explicitly declined a release
    #[error("Payout failed for escrow {escrow_id}: {reason}")]
    PayoutFailed { escrow_id: String, reason: String },

    /// The payout gateway explicitly declined a refund
    #[error("Refund failed for escrow {escrow_id}: {reason}")]
    RefundFailed { escrow_id: String, reason: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Storage backend failure (not a conflict)
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl TrustlineError {
    /// Check if this error is safe to retry after a re-read.
    ///
    /// Only version conflicts qualify: the caller re-reads the record,
    /// recomputes the transition against fresh state, and resubmits.
    /// A `GatewayTimeout` is "unknown outcome" — retry only after an
    /// idempotent status check.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Get an error code for API responses and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EscrowNotFound { .. } => "ESCROW_NOT_FOUND",
            Self::MilestoneNotFound { .. } => "MILESTONE_NOT_FOUND",
            Self::DisputeNotFound { .. } => "DISPUTE_NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::InvalidMilestoneState { .. } => "INVALID_MILESTONE_STATE",
            Self::InvalidDisputeState { .. } => "INVALID_DISPUTE_STATE",
            Self::InvalidResolution { .. } => "INVALID_RESOLUTION",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::AmountOverrun { .. } => "AMOUNT_OVERRUN",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::GatewayTimeout { .. } => "GATEWAY_TIMEOUT",
            Self::PaymentFailed { .. } => "PAYMENT_FAILED",
            Self::PayoutFailed { .. } => "PAYOUT_FAILED",
            Self::RefundFailed { .. } => "REFUND_FAILED",
            Self::Storage { .. } => "STORAGE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = TrustlineError::VersionConflict {
            entity: "escrow",
            id: "x".to_string(),
            expected: 3,
            actual: 4,
        };
        assert!(conflict.is_retryable());

        let timeout = TrustlineError::GatewayTimeout {
            operation: "payout",
            escrow_id: "x".to_string(),
        };
        assert!(!timeout.is_retryable());

        let not_found = TrustlineError::EscrowNotFound {
            escrow_id: "x".to_string(),
        };
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_error_codes() {
        let err = TrustlineError::VersionConflict {
            entity: "escrow",
            id: "x".to_string(),
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.error_code(), "VERSION_CONFLICT");
        assert!(err.to_string().contains("expected v3"));
    }
}
