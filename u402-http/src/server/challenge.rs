//! The `402 Payment Required` challenge.
//!
//! A challenge offers both payment modes at once: the facilitator
//! requirements plus a live USDC quote for gasless payers, and the
//! marketplace payment parameters for traditional payers.

use alloy_primitives::Address;
use serde::Serialize;
use u402::amount::TokenAmount;
use u402::config::{CHALLENGE_VERSION, PaymentConfig};
use u402::proto::{Currency, PaymentRequirements, build_requirements};
use u402::quote::{Quote, QuoteError};

use crate::constants::{
    GASLESS_METHOD, MODE_HEADER, PAYER_HEADER, PAYMENT_HEADER, PAYMENT_REQUIRED_ERROR,
    TRADITIONAL_METHOD,
};

/// Version of the traditional payment parameters.
pub const PAYMENT_INFO_VERSION: &str = "1.0";

/// Settlement token as advertised to payers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Token contract.
    pub address: Address,
    /// Ticker.
    pub symbol: String,
    /// Decimals of the smallest unit.
    pub decimals: u8,
}

/// Gasless block of a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessOffer {
    /// Whether the gate accepts gasless payments.
    pub enabled: bool,
    /// Token to authorize.
    pub token: TokenInfo,
    /// Quote of the price; `totalRaw` is the amount to authorize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    /// Requirements the facilitator will check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<PaymentRequirements>,
    /// Facilitator base URL.
    pub facilitator: String,
}

/// Traditional payment parameters for a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    /// Parameter set version.
    pub version: &'static str,
    /// Payee.
    pub recipient: Address,
    /// Facilitator base URL.
    pub facilitator: String,
    /// Price in wei.
    pub amount: TokenAmount,
    /// Always ETH.
    pub currency: Currency,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Network name.
    pub network: String,
}

/// Traditional payment parameters for `price_wei` under `config`.
#[must_use]
pub fn payment_info(config: &PaymentConfig, price_wei: TokenAmount) -> PaymentInfo {
    PaymentInfo {
        version: PAYMENT_INFO_VERSION,
        recipient: config.recipient,
        facilitator: config.facilitator_url.clone(),
        amount: price_wei,
        currency: Currency::Eth,
        chain_id: config.chain_id,
        network: config.network.clone(),
    }
}

/// `x402` member of a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDetails {
    /// Challenge format version.
    pub version: &'static str,
    /// What the payment is for.
    pub description: String,
    /// Accepted methods, gasless first when offered.
    pub payment_methods: Vec<&'static str>,
    /// Gasless mode.
    pub gasless: GaslessOffer,
    /// Traditional mode.
    pub traditional: PaymentInfo,
    /// How to retry.
    pub instructions: String,
}

/// Body of a `402 Payment Required` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Challenge {
    /// Always `Payment Required`.
    pub error: &'static str,
    /// Payment details.
    pub x402: ChallengeDetails,
}

impl Challenge {
    /// Builds the challenge for a resource priced at `price_wei`.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError`] when the price cannot be quoted in the
    /// settlement token.
    pub fn new(
        config: &PaymentConfig,
        price_wei: TokenAmount,
        resource: &str,
        description: &str,
    ) -> Result<Self, QuoteError> {
        let (quote, requirements, payment_methods) = if config.gasless_enabled {
            let quote = config.quote_calculator().quote_wei(price_wei.inner())?;
            let requirements = build_requirements(
                config,
                quote.total_raw,
                config.recipient,
                resource,
                description,
            );
            (
                Some(quote),
                Some(requirements),
                vec![GASLESS_METHOD, TRADITIONAL_METHOD],
            )
        } else {
            (None, None, vec![TRADITIONAL_METHOD])
        };

        let instructions = if config.gasless_enabled {
            format!(
                "Gasless: sign the TransferWithAuthorization for gasless.quote.totalRaw and send \
                 {{authorization, signature}} in {PAYMENT_HEADER}. Traditional: sign the \
                 UltraMarket Payment message and send {{signature, amount, nonce, timestamp}} in \
                 {PAYMENT_HEADER} with {PAYER_HEADER} and {MODE_HEADER}: traditional."
            )
        } else {
            format!(
                "Sign the UltraMarket Payment message and send {{signature, amount, nonce, \
                 timestamp}} in {PAYMENT_HEADER} with {PAYER_HEADER}."
            )
        };

        Ok(Self {
            error: PAYMENT_REQUIRED_ERROR,
            x402: ChallengeDetails {
                version: CHALLENGE_VERSION,
                description: description.to_owned(),
                payment_methods,
                gasless: GaslessOffer {
                    enabled: config.gasless_enabled,
                    token: TokenInfo {
                        address: config.token.address,
                        symbol: config.token.symbol.clone(),
                        decimals: config.token.decimals,
                    },
                    quote,
                    requirements,
                    facilitator: config.facilitator_url.clone(),
                },
                traditional: payment_info(config, price_wei),
                instructions,
            },
        })
    }
}
