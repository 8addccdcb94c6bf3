//! A [`u402::facilitator::Facilitator`] implementation that talks to a _remote_ x402 facilitator over HTTP.
//!
//! [`FacilitatorClient`] posts the version 1 envelope to `/verify` and
//! `/settle` and decodes the answers.
//!
//! ## Features
//!
//! - Uses `reqwest` for async HTTP requests
//! - Per-request timeout, defaulting to [`FacilitatorClient::DEFAULT_TIMEOUT`]
//! - Optional custom headers
//! - Integrates with `tracing` if the `telemetry` feature is enabled
//!
//! ## Error Handling
//!
//! Any failure to obtain a readable answer is a [`FacilitatorClientError`]:
//! - URL construction
//! - HTTP transport failures and timeouts
//! - Unexpected HTTP status responses
//! - JSON deserialization errors
//!
//! An `isValid: false` or `success: false` answer is not an error.
//! Settlement is never retried.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use std::fmt::Display;
use std::time::Duration;
use u402::facilitator::Facilitator;
use u402::proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span};

/// A client for communicating with a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Custom headers sent with each request
    headers: HeaderMap,
    /// Request timeout
    timeout: Duration,
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    /// Verifies a payment payload with the facilitator.
    #[cfg(feature = "telemetry")]
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorClientError> {
        with_span(
            Self::verify(self, request),
            tracing::info_span!("u402.facilitator_client.verify", timeout = ?self.timeout),
        )
        .await
    }

    /// Verifies a payment payload with the facilitator.
    #[cfg(not(feature = "telemetry"))]
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorClientError> {
        Self::verify(self, request).await
    }

    /// Settles a verified payment with the facilitator.
    #[cfg(feature = "telemetry")]
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorClientError> {
        with_span(
            Self::settle(self, request),
            tracing::info_span!("u402.facilitator_client.settle", timeout = ?self.timeout),
        )
        .await
    }

    /// Settles a verified payment with the facilitator.
    #[cfg(not(feature = "telemetry"))]
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorClientError> {
        Self::settle(self, request).await
    }
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator did not answer in time.
    #[error("Timed out after {timeout:?}: {context}")]
    Timeout {
        /// Human-readable context.
        context: &'static str,
        /// The configured timeout.
        timeout: Duration,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl FacilitatorClient {
    /// Default upper bound of each facilitator round trip.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns any custom headers configured on the client.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// This sets up `./verify` and `./settle` endpoint URLs relative to the base.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./verify URL",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "Failed to construct ./settle URL",
                source: e,
            })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            headers: HeaderMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a `POST /verify` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if no readable answer was obtained.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if no readable answer was obtained.
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// Generic POST helper that handles JSON serialization, error mapping,
    /// timeout application, and telemetry integration.
    ///
    /// `context` is a human-readable identifier used in tracing and error messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self
            .client
            .post(url.clone())
            .json(payload)
            .timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        let timeout = self.timeout;
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FacilitatorClientError::Timeout { context, timeout }
            } else {
                FacilitatorClientError::Http { context, source: e }
            }
        };
        let http_response = req.send().await.map_err(transport)?;

        let result = if http_response.status().is_success() {
            http_response.json::<R>().await.map_err(|e| {
                if e.is_timeout() {
                    FacilitatorClientError::Timeout { context, timeout }
                } else {
                    FacilitatorClientError::JsonDeserialization { context, source: e }
                }
            })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Converts a String URL into a `FacilitatorClient`.
impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("status", "ok");
        }
        Err(err) => {
            span.record("status", "error");
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

/// Instruments a future with a given tracing span.
#[cfg(feature = "telemetry")]
fn with_span<F: Future>(fut: F, span: Span) -> impl Future<Output = F::Output> {
    fut.instrument(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, Bytes};
    use u402::amount::TokenAmount;
    use u402::config::PaymentConfig;
    use u402::proto::{AuthorizationMessage, build_payload, build_requirements};
    use u402::timestamp::UnixTimestamp;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_request() -> VerifyRequest {
        let config = PaymentConfig::default();
        let authorization = AuthorizationMessage {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            value: TokenAmount::from(2_562_500_u64),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(4_102_444_800),
            nonce: B256::repeat_byte(0x33),
        };
        VerifyRequest::new(
            build_payload(&config, Bytes::from(vec![0x01; 65]), authorization),
            build_requirements(
                &config,
                TokenAmount::from(2_562_500_u64),
                Address::repeat_byte(0x22),
                "ultramarket://premium/execute",
                "UltraMarket Task Payment",
            ),
        )
    }

    fn client_for(server: &MockServer) -> FacilitatorClient {
        FacilitatorClient::try_from(server.uri()).unwrap()
    }

    #[test]
    fn test_urls_are_relative_to_base() {
        let client = FacilitatorClient::try_from("https://facilitator.example.com/api//").unwrap();
        assert_eq!(
            client.verify_url().as_str(),
            "https://facilitator.example.com/api/verify"
        );
        assert_eq!(
            client.settle_url().as_str(),
            "https://facilitator.example.com/api/settle"
        );
        assert_eq!(client.timeout(), FacilitatorClient::DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_verify_valid_posts_envelope() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(serde_json::json!({
                "x402Version": 1,
                "paymentPayload": {"scheme": "exact", "network": "base-sepolia"},
                "paymentRequirements": {"maxAmountRequired": "2562500"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "isValid": true,
                "payer": "0x1111111111111111111111111111111111111111"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client_for(&mock_server)
            .verify(&create_test_request())
            .await
            .unwrap();
        assert!(response.is_valid);
        assert!(response.payer.is_some());
    }

    #[tokio::test]
    async fn test_verify_invalid_is_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "isValid": false,
                "invalidReason": "expired"
            })))
            .mount(&mock_server)
            .await;

        let response = client_for(&mock_server)
            .verify(&create_test_request())
            .await
            .unwrap();
        assert_eq!(response, VerifyResponse::invalid("expired"));
    }

    #[tokio::test]
    async fn test_settle_success_and_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errorReason": "insufficient_funds"
            })))
            .mount(&mock_server)
            .await;

        let response = client_for(&mock_server)
            .settle(&create_test_request())
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.error_reason.as_deref(), Some("insufficient_funds"));
    }

    #[tokio::test]
    async fn test_server_error_is_reported_with_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .settle(&create_test_request())
            .await
            .unwrap_err();
        match err {
            FacilitatorClientError::HttpStatus { status, body, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .verify(&create_test_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FacilitatorClientError::JsonDeserialization { .. }
        ));
    }

    #[tokio::test]
    async fn test_slow_facilitator_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"isValid": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .with_timeout(Duration::from_millis(100))
            .verify(&create_test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, FacilitatorClientError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_facilitator_is_transport_error() {
        let client = FacilitatorClient::try_from("http://127.0.0.1:9").unwrap();
        let err = client.verify(&create_test_request()).await.unwrap_err();
        assert!(matches!(
            err,
            FacilitatorClientError::Http { .. } | FacilitatorClientError::Timeout { .. }
        ));
    }
}
