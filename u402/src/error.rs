//! Payment rejection taxonomy.
//!
//! Every way a presented payment can fail. The gate turns each variant into
//! a structured 402 response carrying [`PaymentError::reason`]; none of them
//! escape as generic server errors. A request without any payment is not an
//! error: it receives the challenge.

use crate::amount::TokenAmount;

/// A rejected payment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    /// The payment header could not be parsed.
    #[error("malformed payment payload: {0}")]
    MalformedPayload(String),

    /// A gasless payment arrived while the gate only accepts traditional ones.
    #[error("gasless payments are disabled")]
    GaslessDisabled,

    /// The signed amount is below the price.
    #[error("insufficient amount: paid {paid}, required {required}")]
    InsufficientAmount {
        /// Amount carried by the payment.
        paid: TokenAmount,
        /// Price of the resource.
        required: TokenAmount,
    },

    /// The payment timestamp or validity window does not cover now.
    #[error("payment timestamp outside the accepted window")]
    ExpiredTimestamp,

    /// The nonce was already consumed or is being consumed.
    #[error("payment nonce already used")]
    ReplayedNonce,

    /// The signature does not recover to the claimed payer.
    #[error("invalid payment signature")]
    InvalidSignature,

    /// The facilitator declined the payment on verify.
    #[error("facilitator rejected the payment: {0}")]
    FacilitatorRejected(String),

    /// The facilitator failed to execute the payment on settle.
    #[error("settlement failed: {0}")]
    SettlementFailed(String),

    /// The facilitator could not be reached or answered unreadably.
    #[error("facilitator unreachable: {0}")]
    FacilitatorUnreachable(String),
}

impl PaymentError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed_payload",
            Self::GaslessDisabled => "gasless_disabled",
            Self::InsufficientAmount { .. } => "insufficient_amount",
            Self::ExpiredTimestamp => "expired_timestamp",
            Self::ReplayedNonce => "replayed_nonce",
            Self::InvalidSignature => "invalid_signature",
            Self::FacilitatorRejected(_) => "facilitator_rejected",
            Self::SettlementFailed(_) => "settlement_failed",
            Self::FacilitatorUnreachable(_) => "facilitator_unreachable",
        }
    }

    /// Detail reported by the facilitator or the parser, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::MalformedPayload(detail)
            | Self::FacilitatorRejected(detail)
            | Self::SettlementFailed(detail)
            | Self::FacilitatorUnreachable(detail) => Some(detail),
            _ => None,
        }
    }

    /// Returns `true` for failures on the facilitator leg, where falling back
    /// to traditional mode may help.
    #[must_use]
    pub const fn is_facilitator_failure(&self) -> bool {
        matches!(
            self,
            Self::FacilitatorRejected(_)
                | Self::SettlementFailed(_)
                | Self::FacilitatorUnreachable(_)
        )
    }

    /// Returns `true` when resubmitting in traditional mode may succeed.
    #[must_use]
    pub const fn suggests_traditional(&self) -> bool {
        matches!(self, Self::GaslessDisabled) || self.is_facilitator_failure()
    }
}
