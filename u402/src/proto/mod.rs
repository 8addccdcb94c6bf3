//! Wire format types for UltraMarket payments.
//!
//! Two families of messages cross the wire:
//!
//! - Client to gate: the signed messages carried in the `X-402-Payment`
//!   header, either a [`TraditionalPaymentHeader`] (direct mode) or a
//!   typed-data authorization (gasless mode, see the `u402-evm` crate).
//! - Gate to facilitator: the [`v1`] `PaymentPayload` /
//!   `PaymentRequirements` envelopes and the verify/settle responses.
//!
//! All integer fields that can exceed 2^53 are carried as decimal strings.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::amount::TokenAmount;
use crate::timestamp::{UnixMillis, UnixTimestamp};

pub mod v1;

pub use v1::{
    ExactPayload, PaymentPayload, PaymentRequirements, PaymentRequirementsExtra, SettleRequest,
    SettleResponse, VerifyRequest, VerifyResponse, build_payload, build_requirements,
};

/// The only payment scheme spoken here: `"exact"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExactScheme;

impl ExactScheme {
    /// Wire identifier.
    pub const ID: &'static str = "exact";
}

impl Display for ExactScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(Self::ID)
    }
}

impl Serialize for ExactScheme {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(Self::ID)
    }
}

impl<'de> Deserialize<'de> for ExactScheme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == Self::ID {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported scheme {s:?}, expected \"exact\""
            )))
        }
    }
}

/// ERC-3009 `TransferWithAuthorization` message: the gasless payload.
///
/// `validAfter <= now <= validBefore` must hold when the gate verifies it,
/// and `nonce` is single use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationMessage {
    /// Payer, the token owner.
    pub from: Address,
    /// Payee.
    pub to: Address,
    /// Amount in the settlement token's smallest unit.
    pub value: TokenAmount,
    /// Not valid before this instant.
    pub valid_after: UnixTimestamp,
    /// Not valid after this instant.
    pub valid_before: UnixTimestamp,
    /// Random 32-byte nonce.
    pub nonce: B256,
}

impl AuthorizationMessage {
    /// Whether `now` falls inside `[validAfter, validBefore]`.
    #[must_use]
    pub fn is_valid_at(&self, now: UnixTimestamp) -> bool {
        self.valid_after <= now && now <= self.valid_before
    }
}

/// Marketplace `Payment` message: the traditional (direct) payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraditionalPaymentMessage {
    /// Payer, taken from the `X-402-Payer` header.
    pub payer: Address,
    /// Payee, the deployment's recipient.
    pub recipient: Address,
    /// Amount in wei.
    pub amount: TokenAmount,
    /// Unique `uint256` token.
    pub nonce: TokenAmount,
    /// Signing time in milliseconds.
    pub timestamp: UnixMillis,
}

/// JSON body of the `X-402-Payment` header in traditional mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraditionalPaymentHeader {
    /// EIP-712 signature over the [`TraditionalPaymentMessage`].
    pub signature: Bytes,
    /// Amount in wei.
    pub amount: TokenAmount,
    /// Unique `uint256` token.
    pub nonce: TokenAmount,
    /// Signing time in milliseconds.
    pub timestamp: UnixMillis,
}

impl TraditionalPaymentHeader {
    /// The message the signature is expected to cover.
    #[must_use]
    pub const fn message(&self, payer: Address, recipient: Address) -> TraditionalPaymentMessage {
        TraditionalPaymentMessage {
            payer,
            recipient,
            amount: self.amount,
            nonce: self.nonce,
            timestamp: self.timestamp,
        }
    }
}

/// How a request pays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Signature-gated native-asset payment.
    Traditional,
    /// Delegated ERC-3009 transfer settled by the facilitator.
    #[default]
    Gasless,
}

impl PaymentMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Traditional => "traditional",
            Self::Gasless => "gasless",
        }
    }
}

impl Display for PaymentMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown payment mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported payment mode {0:?}, expected \"gasless\" or \"traditional\"")]
pub struct UnknownPaymentMode(pub String);

impl FromStr for PaymentMode {
    type Err = UnknownPaymentMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "traditional" => Ok(Self::Traditional),
            "gasless" => Ok(Self::Gasless),
            _ => Err(UnknownPaymentMode(s.to_owned())),
        }
    }
}

/// Currency an outcome was paid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Native asset, amounts in wei.
    Eth,
    /// Settlement token, amounts in micro-units.
    Usdc,
}

/// Verified payment attached to the request for downstream handlers.
///
/// Handlers read it from the request extensions and never re-verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    /// Payer address.
    pub payer: Address,
    /// Amount paid, in the smallest unit of `currency`.
    pub amount: TokenAmount,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Mode the payment was made in.
    pub mode: PaymentMode,
    /// Consumed nonce.
    pub nonce: String,
    /// Settlement transaction (gasless only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// Network the settlement happened on (gasless only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Always `true` for outcomes produced by the gate.
    pub verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_scheme_roundtrip_and_rejection() {
        assert_eq!(serde_json::to_string(&ExactScheme).unwrap(), "\"exact\"");
        assert!(serde_json::from_str::<ExactScheme>("\"upto\"").is_err());
    }

    #[test]
    fn test_payment_mode_parsing() {
        assert_eq!("Gasless".parse::<PaymentMode>().unwrap(), PaymentMode::Gasless);
        assert_eq!(
            " traditional ".parse::<PaymentMode>().unwrap(),
            PaymentMode::Traditional
        );
        assert!("credit".parse::<PaymentMode>().is_err());
        assert_eq!(PaymentMode::default(), PaymentMode::Gasless);
    }

    #[test]
    fn test_traditional_header_accepts_js_shapes() {
        let json = r#"{
            "signature": "0x1234",
            "amount": "1000000000000000",
            "nonce": 42,
            "timestamp": 1700000000000
        }"#;
        let header: TraditionalPaymentHeader = serde_json::from_str(json).unwrap();
        assert_eq!(header.nonce, TokenAmount::from(42_u64));
        assert_eq!(header.timestamp.as_millis(), 1_700_000_000_000);
        assert_eq!(header.signature.len(), 2);
    }

    #[test]
    fn test_authorization_window_is_inclusive() {
        let message = AuthorizationMessage {
            from: Address::ZERO,
            to: Address::ZERO,
            value: TokenAmount::ZERO,
            valid_after: UnixTimestamp::from_secs(100),
            valid_before: UnixTimestamp::from_secs(200),
            nonce: B256::ZERO,
        };
        assert!(message.is_valid_at(UnixTimestamp::from_secs(100)));
        assert!(message.is_valid_at(UnixTimestamp::from_secs(200)));
        assert!(!message.is_valid_at(UnixTimestamp::from_secs(99)));
        assert!(!message.is_valid_at(UnixTimestamp::from_secs(201)));
    }

    #[test]
    fn test_outcome_serialization_skips_empty_settlement() {
        let outcome = PaymentOutcome {
            payer: Address::ZERO,
            amount: TokenAmount::from(5_u64),
            currency: Currency::Eth,
            mode: PaymentMode::Traditional,
            nonce: "7".to_owned(),
            transaction: None,
            network: None,
            verified: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["mode"], "traditional");
        assert_eq!(json["currency"], "ETH");
        assert!(json.get("transaction").is_none());
    }
}
