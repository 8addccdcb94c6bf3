#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport of the UltraMarket x402 payment gate.
//!
//! # Modules
//!
//! - [`constants`] - Header names, status code and challenge strings
//! - [`server`] - Facilitator client and the tower/axum payment gate
//!
//! # Feature Flags
//!
//! - `telemetry` - Tracing spans and events for every gate decision

pub mod constants;
pub mod server;

pub use server::{FacilitatorClient, PaygateError, X402Layer, X402Middleware};
