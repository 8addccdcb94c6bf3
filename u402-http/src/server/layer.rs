//! Tower layer wiring the [`Paygate`] into an axum router.
//!
//! Create one [`X402Middleware`] per application; it owns the facilitator,
//! the configuration, the nonce ledger and the signature verifier shared by
//! every protected route. Price each route with
//! [`X402Middleware::with_price`]:
//!
//! ```ignore
//! let x402 = X402Middleware::try_from_config(config)?;
//! let app = Router::new().route(
//!     "/api/premium/execute",
//!     post(execute).layer(x402.with_default_price().with_description("Premium task")),
//! );
//! ```
//!
//! The nonce ledger is shared by all layers built from the same middleware,
//! so a nonce consumed on one route is rejected on every other.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use u402::amount::TokenAmount;
use u402::config::PaymentConfig;
use u402::facilitator::Facilitator;
use u402::nonce::{InMemoryNonceLedger, NonceLedger};
use u402_evm::{Eip712Verifier, PaymentSignatureVerifier};

use super::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use super::paygate::{Paygate, ResourceInfo};

/// The main X402 middleware instance for enforcing x402 payments on routes.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // dyn PaymentSignatureVerifier is not Debug
pub struct X402Middleware<F> {
    facilitator: F,
    config: Arc<PaymentConfig>,
    ledger: Arc<dyn NonceLedger>,
    verifier: Arc<dyn PaymentSignatureVerifier>,
}

impl<F> X402Middleware<F> {
    /// Creates a middleware with an in-memory ledger and the local EIP-712 verifier.
    pub fn new(facilitator: F, config: impl Into<Arc<PaymentConfig>>) -> Self {
        Self {
            facilitator,
            config: config.into(),
            ledger: Arc::new(InMemoryNonceLedger::new()),
            verifier: Arc::new(Eip712Verifier),
        }
    }

    /// Returns a reference to the underlying facilitator.
    pub const fn facilitator(&self) -> &F {
        &self.facilitator
    }

    /// Returns the shared configuration.
    pub const fn config(&self) -> &Arc<PaymentConfig> {
        &self.config
    }

    /// Returns the shared nonce ledger.
    pub const fn ledger(&self) -> &Arc<dyn NonceLedger> {
        &self.ledger
    }

    /// Replaces the nonce ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn NonceLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Replaces the signature verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn PaymentSignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

impl X402Middleware<Arc<FacilitatorClient>> {
    /// Creates a middleware talking to the facilitator named in `config`,
    /// bounded by its `facilitator_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::UrlParse`] if the facilitator URL is invalid.
    pub fn try_from_config(config: PaymentConfig) -> Result<Self, FacilitatorClientError> {
        let facilitator = FacilitatorClient::try_from(config.facilitator_url.as_str())?
            .with_timeout(config.facilitator_timeout);
        Ok(Self::new(Arc::new(facilitator), config))
    }
}

impl<F: Clone> X402Middleware<F> {
    /// Builds a layer pricing the route at `price_wei`.
    #[must_use]
    pub fn with_price(&self, price_wei: TokenAmount) -> X402Layer<F> {
        X402Layer {
            facilitator: self.facilitator.clone(),
            config: Arc::clone(&self.config),
            ledger: Arc::clone(&self.ledger),
            verifier: Arc::clone(&self.verifier),
            price_wei,
            resource: Arc::new(ResourceInfo::default()),
        }
    }

    /// Builds a layer at the configured default price.
    #[must_use]
    pub fn with_default_price(&self) -> X402Layer<F> {
        self.with_price(self.config.default_price_wei)
    }
}

/// Layer guarding one route at one price.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // dyn PaymentSignatureVerifier is not Debug
pub struct X402Layer<F> {
    facilitator: F,
    config: Arc<PaymentConfig>,
    ledger: Arc<dyn NonceLedger>,
    verifier: Arc<dyn PaymentSignatureVerifier>,
    price_wei: TokenAmount,
    resource: Arc<ResourceInfo>,
}

impl<F> X402Layer<F> {
    /// Sets a description of what the payment grants access to.
    ///
    /// This is included in 402 responses to inform clients what they're paying for.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let mut resource = (*self.resource).clone();
        resource.description = description.into();
        self.resource = Arc::new(resource);
        self
    }

    /// Sets the resource identifier sent to the facilitator.
    ///
    /// Defaults to the request path.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        let mut info = (*self.resource).clone();
        info.url = Some(resource.into());
        self.resource = Arc::new(info);
        self
    }

    /// Price of the route in wei.
    pub const fn price_wei(&self) -> TokenAmount {
        self.price_wei
    }
}

impl<S, F> Layer<S> for X402Layer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    F: Facilitator + Clone,
{
    type Service = X402MiddlewareService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            facilitator: self.facilitator.clone(),
            config: Arc::clone(&self.config),
            ledger: Arc::clone(&self.ledger),
            verifier: Arc::clone(&self.verifier),
            price_wei: self.price_wei,
            resource: Arc::clone(&self.resource),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces x402 payments on incoming requests.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct X402MiddlewareService<F> {
    /// Payment facilitator
    facilitator: F,
    /// Deployment parameters
    config: Arc<PaymentConfig>,
    /// Ledger shared with every other route of the middleware
    ledger: Arc<dyn NonceLedger>,
    /// Signature checks
    verifier: Arc<dyn PaymentSignatureVerifier>,
    /// Route price in wei
    price_wei: TokenAmount,
    /// Resource information
    resource: Arc<ResourceInfo>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Service<Request> for X402MiddlewareService<F>
where
    F: Facilitator + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Intercepts the request, injects payment enforcement logic, and forwards to the wrapped service.
    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            facilitator: self.facilitator.clone(),
            config: Arc::clone(&self.config),
            ledger: Arc::clone(&self.ledger),
            verifier: Arc::clone(&self.verifier),
            price_wei: self.price_wei,
            resource: self.resource.resolve(req.uri()),
            description: self.resource.description.clone(),
        };
        let inner = self.inner.clone();
        Box::pin(gate.handle_request(inner, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_share_one_ledger() {
        let middleware = X402Middleware::try_from_config(PaymentConfig::default()).unwrap();
        let cheap = middleware.with_price(TokenAmount::from(1_u64));
        let default = middleware.with_default_price().with_description("Premium");
        assert!(Arc::ptr_eq(&cheap.ledger, middleware.ledger()));
        assert!(Arc::ptr_eq(&default.ledger, middleware.ledger()));
        assert_eq!(default.price_wei(), PaymentConfig::default().default_price_wei);
        assert_eq!(default.resource.description, "Premium");
        assert_eq!(
            middleware.facilitator().timeout(),
            PaymentConfig::default().facilitator_timeout
        );
    }
}
