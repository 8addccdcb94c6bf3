//! Error types for the payment gate middleware.
//!
//! Payment rejections render as `402 Payment Required` with a structured
//! JSON body; only internal faults render as `500`.

use axum_core::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use u402::error::PaymentError;

use crate::constants::{MODE_HEADER, PAYMENT_INVALID_ERROR, PAYMENT_PROCESSING_ERROR};

/// Paygate error type that wraps payment rejections and internal faults.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// The presented payment was rejected.
    #[error(transparent)]
    Payment(#[from] PaymentError),
    /// The gate itself is misconfigured or hit a defect.
    #[error("internal payment gate error: {0}")]
    Internal(String),
}

/// JSON body of a rejected payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionBody {
    /// Short category.
    pub error: &'static str,
    /// Machine-readable reason code.
    pub reason: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Facilitator or parser detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// What the client may try instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&PaymentError> for RejectionBody {
    fn from(err: &PaymentError) -> Self {
        Self {
            error: if err.is_facilitator_failure() {
                PAYMENT_PROCESSING_ERROR
            } else {
                PAYMENT_INVALID_ERROR
            },
            reason: err.reason(),
            message: err.to_string(),
            detail: err.detail().map(str::to_owned),
            suggestion: err
                .suggests_traditional()
                .then(|| format!("retry with header {MODE_HEADER}: traditional")),
        }
    }
}

/// Serializes `body` as a JSON response with `status`.
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

impl IntoResponse for PaygateError {
    fn into_response(self) -> Response {
        match self {
            Self::Payment(err) => {
                json_response(StatusCode::PAYMENT_REQUIRED, &RejectionBody::from(&err))
            }
            Self::Internal(message) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({
                    "error": "Internal Server Error",
                    "message": message,
                }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facilitator_failure_body_suggests_traditional() {
        let body = RejectionBody::from(&PaymentError::FacilitatorRejected("expired".into()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Payment Processing Error");
        assert_eq!(json["reason"], "facilitator_rejected");
        assert_eq!(json["detail"], "expired");
        assert!(json["suggestion"].as_str().unwrap().contains("traditional"));
    }

    #[test]
    fn test_local_rejection_body_has_no_suggestion() {
        let body = RejectionBody::from(&PaymentError::ReplayedNonce);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Payment Invalid");
        assert_eq!(json["reason"], "replayed_nonce");
        assert!(json.get("suggestion").is_none());
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn test_gasless_disabled_body_suggests_traditional() {
        let body = RejectionBody::from(&PaymentError::GaslessDisabled);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Payment Invalid");
        assert_eq!(json["reason"], "gasless_disabled");
        assert!(json["suggestion"].as_str().unwrap().contains("traditional"));
    }

    #[test]
    fn test_status_codes() {
        let payment = PaygateError::from(PaymentError::InvalidSignature).into_response();
        assert_eq!(payment.status(), StatusCode::PAYMENT_REQUIRED);
        let internal = PaygateError::Internal("no quote".into()).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
