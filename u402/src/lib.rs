#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the UltraMarket x402 payment gate.
//!
//! UltraMarket gates paid agent work behind HTTP 402. A client that calls a
//! protected endpoint without payment receives a priced challenge; it then
//! retries with a signed payment in the `X-402-Payment` header. Two payment
//! modes exist:
//!
//! - **traditional**: the payer signs a marketplace `Payment` message over an
//!   ETH amount; the gate checks amount, freshness, nonce and signature.
//! - **gasless**: the payer signs an ERC-3009 `TransferWithAuthorization` for
//!   USDC; the gate verifies it locally and delegates settlement to a
//!   [`facilitator`].
//!
//! This crate holds everything that is independent of HTTP and of EIP-712
//! hashing.
//!
//! # Modules
//!
//! - [`amount`] - Integer token amounts carried as decimal strings
//! - [`config`] - Deployment configuration shared by every component
//! - [`error`] - Payment rejection taxonomy
//! - [`facilitator`] - Verify/settle interface of the remote facilitator
//! - [`nonce`] - Single-use nonce ledger
//! - [`proto`] - Wire format types and the facilitator envelope codec
//! - [`quote`] - ETH to USDC quotes
//! - [`timestamp`] - Second and millisecond Unix timestamps
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod config;
pub mod error;
pub mod facilitator;
pub mod nonce;
pub mod proto;
pub mod quote;
pub mod timestamp;
