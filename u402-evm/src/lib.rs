#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-712 support for the UltraMarket x402 payment gate.
//!
//! Payers sign one of two typed-data messages on an EVM chain (Base Sepolia
//! by default). This crate hashes them exactly as wallets do and recovers
//! the signer.
//!
//! # Architecture
//!
//! - [`types`] - `sol!` structs and the two EIP-712 domains
//! - [`typed_data`] - Wallet-shaped typed data documents and their builders
//! - [`verifier`] - Signature recovery behind [`PaymentSignatureVerifier`]
//! - `signer` - Header signing for programmatic payers (feature `client`)
//!
//! # Feature Flags
//!
//! - `client` - Client-side payment signing
//! - `telemetry` - Tracing of signature checks

pub mod typed_data;
pub mod types;
pub mod verifier;

#[cfg(feature = "client")]
pub mod signer;

pub use typed_data::{GaslessPaymentHeader, TypedAuthorization, TypedDataDomain};
pub use verifier::{Eip712Verifier, PaymentSignatureVerifier};
