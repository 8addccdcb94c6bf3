//! Core payment gate logic.
//!
//! The [`Paygate`] struct handles the full payment lifecycle of one request:
//! issuing the challenge, choosing the payment mode, running the local
//! checks, driving the facilitator in gasless mode and attaching the
//! [`PaymentOutcome`] for the protected handler.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use tower::Service;
use u402::amount::TokenAmount;
use u402::config::PaymentConfig;
use u402::error::PaymentError;
use u402::facilitator::Facilitator;
use u402::nonce::{NonceKey, NonceLedger, reserve};
use u402::proto::{
    Currency, PaymentMode, PaymentOutcome, TraditionalPaymentHeader, VerifyRequest,
    build_payload, build_requirements,
};
use u402::timestamp::{UnixMillis, UnixTimestamp};
use u402_evm::types::marketplace_domain;
use u402_evm::{GaslessPaymentHeader, PaymentSignatureVerifier};

#[cfg(feature = "telemetry")]
use tracing::{Instrument, instrument};

use super::challenge::Challenge;
use super::error::{PaygateError, json_response};
use crate::constants::{MODE_HEADER, PAYER_HEADER, PAYMENT_HEADER};

/// Description used when a route does not set one.
pub const DEFAULT_DESCRIPTION: &str = "UltraMarket - Payment for AI Agent task execution";

/// Resource information of a protected route.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Description of the protected resource
    pub description: String,
    /// Optional explicit identifier of the protected resource
    pub url: Option<String>,
}

impl Default for ResourceInfo {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_owned(),
            url: None,
        }
    }
}

impl ResourceInfo {
    /// The resource identifier: the explicit one, or the request path.
    #[must_use]
    pub fn resolve(&self, uri: &Uri) -> String {
        self.url.clone().unwrap_or_else(|| uri.path().to_owned())
    }
}

/// Payment gate for one request.
#[allow(missing_debug_implementations)] // dyn PaymentSignatureVerifier is not Debug
pub struct Paygate<TFacilitator> {
    /// The facilitator for verifying and settling gasless payments
    pub facilitator: TFacilitator,
    /// Deployment parameters
    pub config: Arc<PaymentConfig>,
    /// Consumed nonces
    pub ledger: Arc<dyn NonceLedger>,
    /// Signature checks of both modes
    pub verifier: Arc<dyn PaymentSignatureVerifier>,
    /// Price of the resource in wei
    pub price_wei: TokenAmount,
    /// Resource identifier sent to the facilitator
    pub resource: String,
    /// What the payment is for
    pub description: String,
}

impl<TFacilitator> Paygate<TFacilitator> {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        mut inner: S,
        req: http::Request<ReqBody>,
    ) -> Response
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        let result = inner
            .call(req)
            .instrument(tracing::info_span!("inner"))
            .await;
        #[cfg(not(feature = "telemetry"))]
        let result = inner.call(req).await;
        match result {
            Ok(response) => response.into_response(),
            Err(err) => err.into_response(),
        }
    }

    /// The `402` challenge for this resource.
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError::Internal`] when the price cannot be quoted.
    pub fn challenge(&self) -> Result<Challenge, PaygateError> {
        Challenge::new(&self.config, self.price_wei, &self.resource, &self.description)
            .map_err(|err| PaygateError::Internal(format!("cannot quote price: {err}")))
    }

    /// Amount of settlement token a gasless payer must authorize.
    fn gasless_price(&self) -> Result<TokenAmount, PaygateError> {
        self.config
            .quote_calculator()
            .quote_wei(self.price_wei.inner())
            .map(|quote| quote.total_raw)
            .map_err(|err| PaygateError::Internal(format!("cannot quote price: {err}")))
    }

    /// Runs the traditional checks: amount, freshness, nonce, signature.
    ///
    /// The nonce is consumed only once every check passed.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`PaymentError`].
    pub fn process_traditional(
        &self,
        headers: &HeaderMap,
        payload: serde_json::Value,
    ) -> Result<PaymentOutcome, PaymentError> {
        let header: TraditionalPaymentHeader = serde_json::from_value(payload)
            .map_err(|err| PaymentError::MalformedPayload(err.to_string()))?;
        let payer = payer_address(headers)?;

        if header.amount < self.price_wei {
            return Err(PaymentError::InsufficientAmount {
                paid: header.amount,
                required: self.price_wei,
            });
        }
        if !header
            .timestamp
            .is_fresh(UnixMillis::now(), self.config.validity_window)
        {
            return Err(PaymentError::ExpiredTimestamp);
        }
        let key = NonceKey::Traditional(header.nonce);
        if self.ledger.is_used(&key) {
            return Err(PaymentError::ReplayedNonce);
        }
        let message = header.message(payer, self.config.recipient);
        if !self.verifier.verify_payment(
            &marketplace_domain(&self.config),
            &message,
            &header.signature,
        ) {
            return Err(PaymentError::InvalidSignature);
        }
        self.ledger
            .try_mark_used(key)
            .map_err(|_| PaymentError::ReplayedNonce)?;

        Ok(PaymentOutcome {
            payer,
            amount: header.amount,
            currency: Currency::Eth,
            mode: PaymentMode::Traditional,
            nonce: header.nonce.to_string(),
            transaction: None,
            network: None,
            verified: true,
        })
    }
}

impl<TFacilitator> Paygate<TFacilitator>
where
    TFacilitator: Facilitator + Sync,
{
    /// Handles an incoming request, processing payment if required.
    ///
    /// Returns a 402 response if payment is missing or rejected.
    /// Otherwise, returns the response from the inner service.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "u402.handle_request", skip_all, fields(resource = %self.resource))
    )]
    pub async fn handle_request<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, Infallible>
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        if !self.config.enabled {
            return Ok(Self::call_inner(inner, req).await);
        }
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                match &err {
                    PaygateError::Payment(payment) => tracing::warn!(
                        reason = payment.reason(),
                        detail = ?payment.detail(),
                        "payment rejected"
                    ),
                    PaygateError::Internal(message) => {
                        tracing::error!(%message, "payment gate fault");
                    }
                }
                Ok(err.into_response())
            }
        }
    }

    /// Handles an incoming request, returning rejections as `PaygateError`.
    ///
    /// This is the fallible version of `handle_request` that returns an actual error
    /// instead of turning it into a 402 response. It does not honor
    /// [`PaymentConfig::enabled`].
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError`] if payment processing fails.
    pub async fn handle_request_fallible<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        &self,
        inner: S,
        mut req: http::Request<ReqBody>,
    ) -> Result<Response, PaygateError>
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let Some(header) = req.headers().get(PAYMENT_HEADER) else {
            #[cfg(feature = "telemetry")]
            tracing::debug!("no payment header, issuing challenge");
            let challenge = self.challenge()?;
            return Ok(json_response(StatusCode::PAYMENT_REQUIRED, &challenge));
        };
        let payload = parse_payment_header(header)?;
        let mode = select_mode(req.headers(), &payload)?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(%mode, "payment presented");

        let outcome = match mode {
            PaymentMode::Traditional => self.process_traditional(req.headers(), payload)?,
            PaymentMode::Gasless => self.process_gasless(payload).await?,
        };

        #[cfg(feature = "telemetry")]
        tracing::info!(
            payer = %outcome.payer,
            amount = %outcome.amount,
            mode = %outcome.mode,
            transaction = ?outcome.transaction,
            "payment accepted"
        );

        req.extensions_mut().insert(outcome);
        Ok(Self::call_inner(inner, req).await)
    }

    /// Runs the gasless flow: local checks, then facilitator verify and settle.
    ///
    /// The nonce is reserved before `verify`, consumed after a successful
    /// `settle` and released on every other exit.
    ///
    /// # Errors
    ///
    /// Returns the first failing check or facilitator failure.
    pub async fn process_gasless(
        &self,
        payload: serde_json::Value,
    ) -> Result<PaymentOutcome, PaygateError> {
        if !self.config.gasless_enabled {
            return Err(PaymentError::GaslessDisabled.into());
        }
        let header: GaslessPaymentHeader = serde_json::from_value(payload)
            .map_err(|err| PaymentError::MalformedPayload(err.to_string()))?;
        let message = header.authorization.message;
        if message.to != self.config.recipient {
            return Err(PaymentError::MalformedPayload(format!(
                "authorization pays {}, expected {}",
                message.to, self.config.recipient
            ))
            .into());
        }

        let required = self.gasless_price()?;
        if message.value < required {
            return Err(PaymentError::InsufficientAmount {
                paid: message.value,
                required,
            }
            .into());
        }
        if !message.is_valid_at(UnixTimestamp::now()) {
            return Err(PaymentError::ExpiredTimestamp.into());
        }
        if !self
            .verifier
            .verify_authorization(&header.authorization, &header.signature)
        {
            return Err(PaymentError::InvalidSignature.into());
        }
        let key = NonceKey::Authorization(message.nonce);
        if self.ledger.is_used(&key) {
            return Err(PaymentError::ReplayedNonce.into());
        }
        let reservation =
            reserve(&self.ledger, key).map_err(|_| PaymentError::ReplayedNonce)?;

        let request = VerifyRequest::new(
            build_payload(&self.config, header.signature.clone(), message),
            build_requirements(
                &self.config,
                required,
                self.config.recipient,
                self.resource.clone(),
                self.description.clone(),
            ),
        );
        let timeout = self.config.facilitator_timeout;

        let verified = bounded(timeout, self.facilitator.verify(&request)).await?;
        if !verified.is_valid {
            return Err(PaymentError::FacilitatorRejected(
                verified
                    .invalid_reason
                    .unwrap_or_else(|| "verification failed".to_owned()),
            )
            .into());
        }

        let settled = bounded(timeout, self.facilitator.settle(&request)).await?;
        if !settled.success {
            return Err(PaymentError::SettlementFailed(
                settled
                    .error_reason
                    .unwrap_or_else(|| "settlement failed".to_owned()),
            )
            .into());
        }
        reservation.commit();

        Ok(PaymentOutcome {
            payer: message.from,
            amount: message.value,
            currency: Currency::Usdc,
            mode: PaymentMode::Gasless,
            nonce: message.nonce.to_string(),
            transaction: settled.transaction,
            network: Some(settled.network.unwrap_or_else(|| self.config.network.clone())),
            verified: true,
        })
    }
}

/// Awaits a facilitator call for at most `timeout`.
async fn bounded<T, E: Display>(
    timeout: Duration,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, PaymentError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(PaymentError::FacilitatorUnreachable(err.to_string())),
        Err(_) => Err(PaymentError::FacilitatorUnreachable(format!(
            "no answer within {timeout:?}"
        ))),
    }
}

/// Parses the `X-402-Payment` header as a JSON object.
fn parse_payment_header(header: &HeaderValue) -> Result<serde_json::Value, PaymentError> {
    let text = header.to_str().map_err(|_| {
        PaymentError::MalformedPayload(format!("{PAYMENT_HEADER} is not valid UTF-8"))
    })?;
    let payload: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| PaymentError::MalformedPayload(err.to_string()))?;
    if payload.is_object() {
        Ok(payload)
    } else {
        Err(PaymentError::MalformedPayload(format!(
            "{PAYMENT_HEADER} must be a JSON object"
        )))
    }
}

/// An explicit `X-402-Mode` wins; otherwise a payload carrying an
/// `authorization` is gasless and anything else is traditional.
fn select_mode(
    headers: &HeaderMap,
    payload: &serde_json::Value,
) -> Result<PaymentMode, PaymentError> {
    match headers.get(MODE_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| PaymentError::MalformedPayload(format!("{MODE_HEADER} is not valid UTF-8")))?
            .parse()
            .map_err(|err: u402::proto::UnknownPaymentMode| {
                PaymentError::MalformedPayload(err.to_string())
            }),
        None if payload.get("authorization").is_some() => Ok(PaymentMode::Gasless),
        None => Ok(PaymentMode::Traditional),
    }
}

/// Parses the `X-402-Payer` header, ignoring case.
fn payer_address(headers: &HeaderMap) -> Result<Address, PaymentError> {
    let value = headers
        .get(PAYER_HEADER)
        .ok_or_else(|| PaymentError::MalformedPayload(format!("missing {PAYER_HEADER} header")))?;
    value
        .to_str()
        .map_err(|_| PaymentError::MalformedPayload(format!("{PAYER_HEADER} is not valid UTF-8")))?
        .trim()
        .parse()
        .map_err(|err| PaymentError::MalformedPayload(format!("invalid {PAYER_HEADER}: {err}")))
}
