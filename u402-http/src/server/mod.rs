//! Axum middleware enforcing x402 payments on protected routes.
//!
//! A request without an `X-402-Payment` header receives a `402 Payment
//! Required` challenge offering both payment modes. A request carrying one is
//! verified locally (amount, validity window, nonce, signature) and, in
//! gasless mode, verified and settled by the remote facilitator before the
//! protected handler runs. The accepted [`PaymentOutcome`](u402::proto::PaymentOutcome)
//! is inserted into the request extensions.
//!
//! Every rejection is a `402` with a JSON body naming the failed check in
//! `reason`.
//!
//! See [`X402Middleware`] for configuration.
//! For low-level interaction with the facilitator, see [`facilitator_client::FacilitatorClient`].

pub mod challenge;
pub mod error;
pub mod facilitator_client;
pub mod layer;
pub mod paygate;

pub use challenge::{Challenge, PaymentInfo, payment_info};
pub use error::{PaygateError, RejectionBody};
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use layer::{X402Layer, X402Middleware, X402MiddlewareService};
pub use paygate::{Paygate, ResourceInfo};
