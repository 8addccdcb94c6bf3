//! Server configuration.
//!
//! Every option is a command-line flag with an environment fallback; `.env`
//! is loaded before parsing, so a deployment can be configured entirely from
//! the environment.
//!
//! # Environment Variables
//!
//! - `HOST` - Bind address (default: `0.0.0.0`)
//! - `PORT` - Port (default: `3001`)
//! - `X402_ENABLED` - Enforce payments on gated routes (default: `false`)
//! - `X402_RECIPIENT` - Payee address
//! - `X402_FACILITATOR` - Facilitator base URL
//! - `X402_GASLESS` - Offer gasless payments (default: `true`)
//! - `X402_CHAIN_ID` - EIP-155 chain id (default: `84532`)
//! - `X402_NETWORK` - Network name (default: `base-sepolia`)
//! - `X402_PRICE_WEI` - Price of gated actions in wei (default: `1000000000000000`)
//! - `X402_FACILITATOR_TIMEOUT_SECS` - Facilitator round trip bound (default: `15`)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use alloy_primitives::Address;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use u402::amount::TokenAmount;
use u402::config::{BASE_SEPOLIA_CHAIN_ID, BASE_SEPOLIA_NETWORK, DEFAULT_FACILITATOR_URL, PaymentConfig};

/// UltraMarket API server with x402 payment-gated endpoints.
#[derive(Parser, Debug, Clone)]
#[command(name = "u402-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: IpAddr,

    /// Listening port.
    #[arg(long, short, default_value_t = 3001, env = "PORT")]
    pub port: u16,

    /// Enforce payments on gated routes.
    #[arg(
        long,
        env = "X402_ENABLED",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub x402_enabled: bool,

    /// Payee of both payment modes.
    #[arg(
        long,
        env = "X402_RECIPIENT",
        default_value = "0x0000000000000000000000000000000000000000"
    )]
    pub recipient: Address,

    /// Facilitator base URL.
    #[arg(long, env = "X402_FACILITATOR", default_value = DEFAULT_FACILITATOR_URL)]
    pub facilitator: String,

    /// Offer gasless payments in challenges.
    #[arg(
        long,
        env = "X402_GASLESS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub gasless: bool,

    /// EIP-155 chain id.
    #[arg(long, env = "X402_CHAIN_ID", default_value_t = BASE_SEPOLIA_CHAIN_ID)]
    pub chain_id: u64,

    /// Network name used in payment requirements.
    #[arg(long, env = "X402_NETWORK", default_value = BASE_SEPOLIA_NETWORK)]
    pub network: String,

    /// Price of gated actions in wei.
    #[arg(long, env = "X402_PRICE_WEI", default_value = "1000000000000000")]
    pub price_wei: TokenAmount,

    /// Upper bound of each facilitator round trip, in seconds.
    #[arg(long, env = "X402_FACILITATOR_TIMEOUT_SECS", default_value_t = 15)]
    pub facilitator_timeout_secs: u64,
}

impl ServerConfig {
    /// Socket address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Payment gate configuration; unset fields keep their defaults.
    #[must_use]
    pub fn payment_config(&self) -> PaymentConfig {
        PaymentConfig {
            enabled: self.x402_enabled,
            gasless_enabled: self.gasless,
            recipient: self.recipient,
            facilitator_url: self.facilitator.clone(),
            chain_id: self.chain_id,
            network: self.network.clone(),
            facilitator_timeout: Duration::from_secs(self.facilitator_timeout_secs),
            default_price_wei: self.price_wei,
            ..PaymentConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_map_onto_payment_config() {
        let config = ServerConfig::try_parse_from([
            "u402-server",
            "--port",
            "8080",
            "--x402-enabled",
            "yes",
            "--gasless",
            "false",
            "--recipient",
            "0x2222222222222222222222222222222222222222",
            "--price-wei",
            "500",
            "--facilitator-timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(config.socket_addr().port(), 8080);

        let payment = config.payment_config();
        assert!(payment.enabled);
        assert!(!payment.gasless_enabled);
        assert_eq!(payment.default_price_wei, TokenAmount::from(500_u64));
        assert_eq!(payment.facilitator_timeout, Duration::from_secs(3));
        assert_eq!(
            payment.recipient.to_string().to_lowercase(),
            "0x2222222222222222222222222222222222222222"
        );
        assert_eq!(payment.validity_window, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let result = ServerConfig::try_parse_from(["u402-server", "--recipient", "0x12"]);
        assert!(result.is_err());
    }
}
