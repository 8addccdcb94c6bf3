//! UltraMarket API server.
//!
//! # Usage
//!
//! ```bash
//! # Run with payments disabled
//! cargo run -p u402-server --release
//!
//! # Enforce payments to a recipient
//! X402_ENABLED=true X402_RECIPIENT=0x... cargo run -p u402-server
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p u402-server
//! ```
//!
//! See [`u402_server::config`] for every environment variable.

use alloy_primitives::Address;
use axum::http::Method;
use clap::Parser;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use u402_http::X402Middleware;

use u402_server::{ServerConfig, router};

#[tokio::main]
async fn main() {
    // A missing .env is not an error
    dotenvy::dotenv().ok();

    // Initialize tracing with RUST_LOG env filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    let payment = config.payment_config();
    tracing::info!(
        addr = %config.socket_addr(),
        x402_enabled = payment.enabled,
        gasless = payment.gasless_enabled,
        facilitator = %payment.facilitator_url,
        chain_id = payment.chain_id,
        price_wei = %payment.default_price_wei,
        "Loaded configuration"
    );

    if payment.enabled && payment.recipient == Address::ZERO {
        tracing::warn!("X402_RECIPIENT is not set, payments are addressed to the zero address");
    }

    let x402 = X402Middleware::try_from_config(payment)?;

    let app = router(&x402).layer(TraceLayer::new_for_http()).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("UltraMarket API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let sigterm = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Cannot install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            () = sigterm => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
