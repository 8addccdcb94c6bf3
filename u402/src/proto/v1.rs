//! Facilitator envelope, x402 version 1.
//!
//! The remote facilitator speaks the original x402 wire format: network
//! names (`"base-sepolia"`) instead of CAIP-2 ids and an `x402Version: 1`
//! marker at the root of every request.
//!
//! # Key Types
//!
//! - [`PaymentPayload`] - Signed authorization forwarded to the facilitator
//! - [`PaymentRequirements`] - Terms the facilitator checks the payload against
//! - [`VerifyRequest`] / [`VerifyResponse`] - `POST /verify`
//! - [`SettleRequest`] / [`SettleResponse`] - `POST /settle`

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::config::{FACILITATOR_X402_VERSION, PaymentConfig};
use crate::proto::{AuthorizationMessage, ExactScheme};

/// MIME type of every gated resource.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

/// EIP-712 name/version of the settlement token, as the facilitator expects
/// them under `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequirementsExtra {
    /// Token EIP-712 domain name.
    pub name: String,
    /// Token EIP-712 domain version.
    pub version: String,
}

/// Payment terms for a protected resource.
///
/// Constructed fresh per request by [`build_requirements`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Envelope version (always 1).
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: ExactScheme,
    /// Network name.
    pub network: String,
    /// Required amount in the token's smallest unit.
    pub max_amount_required: TokenAmount,
    /// Settlement token contract.
    pub asset: Address,
    /// Payee.
    pub pay_to: Address,
    /// Opaque name of the protected action.
    pub resource: String,
    /// Human-readable description.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Maximum time the facilitator may take, in seconds.
    pub max_timeout_seconds: u64,
    /// Output schema of the resource. Always sent, `null` when absent.
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    /// Token domain hints.
    pub extra: PaymentRequirementsExtra,
}

/// The `exact` scheme payload: a signature and the authorization it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactPayload {
    /// 65-byte ECDSA signature over the authorization.
    pub signature: Bytes,
    /// The signed `TransferWithAuthorization` message.
    pub authorization: AuthorizationMessage,
}

/// A signed payment forwarded to the facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Envelope version (always 1).
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: ExactScheme,
    /// Network name.
    pub network: String,
    /// Scheme payload.
    pub payload: ExactPayload,
}

/// Body of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Envelope version (always 1), required at the root by the facilitator.
    pub x402_version: u8,
    /// The signed payment.
    pub payment_payload: PaymentPayload,
    /// Terms to check it against.
    pub payment_requirements: PaymentRequirements,
}

impl VerifyRequest {
    /// Wraps a payload and its requirements.
    #[must_use]
    pub const fn new(
        payment_payload: PaymentPayload,
        payment_requirements: PaymentRequirements,
    ) -> Self {
        Self {
            x402_version: FACILITATOR_X402_VERSION,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Body of `POST /settle`, same shape as [`VerifyRequest`].
pub type SettleRequest = VerifyRequest;

/// Result of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the facilitator accepts the payment.
    pub is_valid: bool,
    /// Rejection reason when `is_valid` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Payer the facilitator recovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// An accepting response.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    /// A rejecting response.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            payer: None,
        }
    }
}

/// Result of `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether the transfer was executed.
    pub success: bool,
    /// Settlement transaction hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// Network the transfer was executed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Payer of the transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Failure reason when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl SettleResponse {
    /// A successful settlement.
    #[must_use]
    pub fn settled(transaction: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction: Some(transaction.into()),
            network: Some(network.into()),
            payer: None,
            error_reason: None,
        }
    }

    /// A failed settlement.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: None,
            network: None,
            payer: None,
            error_reason: Some(reason.into()),
        }
    }
}

/// Builds the requirements for a protected resource.
///
/// Scheme, network, asset, MIME type, timeout and token hints come from the
/// deployment configuration; `amount` is in token units.
#[must_use]
pub fn build_requirements(
    config: &PaymentConfig,
    amount: TokenAmount,
    pay_to: Address,
    resource: impl Into<String>,
    description: impl Into<String>,
) -> PaymentRequirements {
    PaymentRequirements {
        x402_version: FACILITATOR_X402_VERSION,
        scheme: ExactScheme,
        network: config.network.clone(),
        max_amount_required: amount,
        asset: config.token.address,
        pay_to,
        resource: resource.into(),
        description: description.into(),
        mime_type: DEFAULT_MIME_TYPE.to_owned(),
        max_timeout_seconds: config.max_timeout_seconds,
        output_schema: None,
        extra: PaymentRequirementsExtra {
            name: config.token.eip712.name.clone(),
            version: config.token.eip712.version.clone(),
        },
    }
}

/// Wraps a signed authorization into the facilitator payload.
#[must_use]
pub fn build_payload(
    config: &PaymentConfig,
    signature: Bytes,
    authorization: AuthorizationMessage,
) -> PaymentPayload {
    PaymentPayload {
        x402_version: FACILITATOR_X402_VERSION,
        scheme: ExactScheme,
        network: config.network.clone(),
        payload: ExactPayload {
            signature,
            authorization,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::UnixTimestamp;
    use alloy_primitives::{B256, address};

    fn authorization() -> AuthorizationMessage {
        AuthorizationMessage {
            from: address!("0x1111111111111111111111111111111111111111"),
            to: address!("0x2222222222222222222222222222222222222222"),
            value: TokenAmount::from(2_562_500_u64),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(1_700_003_600),
            nonce: B256::repeat_byte(0xab),
        }
    }

    #[test]
    fn test_requirements_wire_shape() {
        let config = PaymentConfig::default();
        let requirements = build_requirements(
            &config,
            TokenAmount::from(2_562_500_u64),
            address!("0x2222222222222222222222222222222222222222"),
            "ultramarket://premium/execute",
            "UltraMarket Task Payment",
        );
        let json = serde_json::to_value(&requirements).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["scheme"], "exact");
        assert_eq!(json["network"], "base-sepolia");
        assert_eq!(json["maxAmountRequired"], "2562500");
        assert_eq!(json["mimeType"], "application/json");
        assert_eq!(json["maxTimeoutSeconds"], 60);
        assert!(json["outputSchema"].is_null());
        assert!(json.as_object().unwrap().contains_key("outputSchema"));
        assert_eq!(json["extra"]["name"], "USDC");
        assert_eq!(json["extra"]["version"], "2");
        assert_eq!(
            json["asset"].as_str().unwrap().to_lowercase(),
            "0x036cbd53842c5426634e7929541ec2318f3dcf7e"
        );
    }

    #[test]
    fn test_verify_request_envelope() {
        let config = PaymentConfig::default();
        let payload = build_payload(&config, Bytes::from(vec![0x01; 65]), authorization());
        let requirements = build_requirements(
            &config,
            TokenAmount::from(1_u64),
            Address::ZERO,
            "resource",
            "description",
        );
        let json = serde_json::to_value(VerifyRequest::new(payload, requirements)).unwrap();
        assert_eq!(json["x402Version"], 1);
        let authorization = &json["paymentPayload"]["payload"]["authorization"];
        assert_eq!(authorization["value"], "2562500");
        assert_eq!(authorization["validAfter"], "0");
        assert_eq!(authorization["validBefore"], "1700003600");
        assert_eq!(
            authorization["nonce"],
            format!("0x{}", "ab".repeat(32)).as_str()
        );
        assert!(json["paymentRequirements"].is_object());
    }

    #[test]
    fn test_facilitator_responses_tolerate_missing_fields() {
        let verify: VerifyResponse =
            serde_json::from_str(r#"{"isValid":false,"invalidReason":"expired"}"#).unwrap();
        assert_eq!(verify, VerifyResponse::invalid("expired"));

        let settle: SettleResponse = serde_json::from_str(
            r#"{"success":true,"transaction":"0xdead","network":"base-sepolia","extra":1}"#,
        )
        .unwrap();
        assert_eq!(settle, SettleResponse::settled("0xdead", "base-sepolia"));
    }
}
