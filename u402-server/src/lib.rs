//! UltraMarket marketplace API server.
//!
//! Serves the payment helper endpoints and the payment-gated premium task
//! endpoint on top of the [`u402_http`] middleware.
//!
//! # Modules
//!
//! - [`config`] - Flag and environment configuration
//! - [`error`] - API error responses
//! - [`handlers`] - Axum route handlers and router builder
//! - [`marketplace`] - Agent type vocabulary

pub mod config;
pub mod error;
pub mod handlers;
pub mod marketplace;

pub use config::ServerConfig;
pub use handlers::router;
