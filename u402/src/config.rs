//! Payment gate configuration.
//!
//! A single [`PaymentConfig`] is built at startup and shared as
//! `Arc<PaymentConfig>` by every component that needs deployment
//! parameters: the challenge builder, the signature domains, the quote
//! calculator and the facilitator client.
//!
//! # Example
//!
//! ```rust
//! use u402::config::PaymentConfig;
//!
//! let config = PaymentConfig {
//!     recipient: "0x1111111111111111111111111111111111111111".parse().unwrap(),
//!     ..PaymentConfig::default()
//! };
//! assert_eq!(config.chain_id, 84532);
//! ```

use std::time::Duration;

use alloy_primitives::{Address, U256, address};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::quote::QuoteCalculator;

/// Default remote facilitator.
pub const DEFAULT_FACILITATOR_URL: &str = "https://facilitator.ultravioletadao.xyz";

/// Base Sepolia chain id.
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

/// Network name used in payment requirements for Base Sepolia.
pub const BASE_SEPOLIA_NETWORK: &str = "base-sepolia";

/// Circle's USDC deployment on Base Sepolia.
pub const BASE_SEPOLIA_USDC: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");

/// Version of the x402 envelope sent to the facilitator.
pub const FACILITATOR_X402_VERSION: u8 = 1;

/// Version advertised in the 402 challenge body.
pub const CHALLENGE_VERSION: &str = "2.0";

/// Name/version pair of an EIP-712 domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// EIP-712 domain `name`.
    pub name: String,
    /// EIP-712 domain `version`.
    pub version: String,
}

/// The ERC-3009 token gasless payments settle in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementToken {
    /// Token contract (the EIP-712 verifying contract).
    pub address: Address,
    /// Ticker shown to payers.
    pub symbol: String,
    /// Decimals of the smallest unit.
    pub decimals: u8,
    /// EIP-712 domain of the token contract.
    pub eip712: DomainConfig,
}

impl Default for SettlementToken {
    fn default() -> Self {
        Self {
            address: BASE_SEPOLIA_USDC,
            symbol: "USDC".to_owned(),
            decimals: 6,
            // Base Sepolia USDC signs as "USDC", not "USD Coin".
            eip712: DomainConfig {
                name: "USDC".to_owned(),
                version: "2".to_owned(),
            },
        }
    }
}

/// Deployment parameters of the payment gate.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// When `false`, the gate forwards every request untouched.
    pub enabled: bool,
    /// Whether the gasless (facilitator) mode is offered in challenges.
    pub gasless_enabled: bool,
    /// Payee of both payment modes and verifying contract of the marketplace domain.
    pub recipient: Address,
    /// Base URL of the remote facilitator.
    pub facilitator_url: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Network name used in payment requirements.
    pub network: String,
    /// Maximum clock distance accepted for traditional payment timestamps.
    pub validity_window: Duration,
    /// EIP-712 domain for traditional marketplace payments.
    pub marketplace_domain: DomainConfig,
    /// Settlement token for gasless payments.
    pub token: SettlementToken,
    /// Settlement-token units per native unit (USDC per ETH).
    pub exchange_rate: Decimal,
    /// Facilitator fee as a fraction of the converted amount.
    pub fee_rate: Decimal,
    /// `maxTimeoutSeconds` advertised in payment requirements.
    pub max_timeout_seconds: u64,
    /// Upper bound for each facilitator round trip.
    pub facilitator_timeout: Duration,
    /// Lifetime of authorizations produced by the authorization request builder.
    pub authorization_validity: Duration,
    /// Price of a protected action when none is configured explicitly, in wei.
    pub default_price_wei: TokenAmount,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gasless_enabled: true,
            recipient: Address::ZERO,
            facilitator_url: DEFAULT_FACILITATOR_URL.to_owned(),
            chain_id: BASE_SEPOLIA_CHAIN_ID,
            network: BASE_SEPOLIA_NETWORK.to_owned(),
            validity_window: Duration::from_secs(5 * 60),
            marketplace_domain: DomainConfig {
                name: "UltraMarket".to_owned(),
                version: "1".to_owned(),
            },
            token: SettlementToken::default(),
            exchange_rate: Decimal::new(2500, 0),
            fee_rate: Decimal::new(25, 3),
            max_timeout_seconds: 60,
            facilitator_timeout: Duration::from_secs(15),
            authorization_validity: Duration::from_secs(60 * 60),
            default_price_wei: TokenAmount(U256::from(1_000_000_000_000_000_u64)),
        }
    }
}

impl PaymentConfig {
    /// Quote calculator for this deployment's rate, fee and token decimals.
    #[must_use]
    pub fn quote_calculator(&self) -> QuoteCalculator {
        QuoteCalculator::new(self.exchange_rate, self.fee_rate, self.token.decimals)
    }
}
