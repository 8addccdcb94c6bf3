//! Native-to-settlement currency quotes.
//!
//! Converts an ETH amount into the USDC amount a gasless payer must
//! authorize. All arithmetic is exact decimal arithmetic; the raw integer
//! forms are rounded up so a payer is never asked for less than the quoted
//! decimal amount.

use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::amount::TokenAmount;

/// Decimals of the native asset (wei per ETH).
pub const NATIVE_DECIMALS: u32 = 18;

/// Errors produced while computing a quote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    /// The input amount was negative.
    #[error("amount must not be negative")]
    Negative,
    /// The input could not be parsed as a decimal number.
    #[error("invalid decimal amount: {0}")]
    InvalidAmount(String),
    /// The amount does not fit the decimal range.
    #[error("amount out of range")]
    Overflow,
}

/// A settlement quote for a native amount.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Input amount in native units (ETH).
    #[serde_as(as = "DisplayFromStr")]
    pub eth_amount: Decimal,
    /// Converted amount, two decimal places for display.
    #[serde_as(as = "DisplayFromStr")]
    pub usdc_amount: Decimal,
    /// Converted amount in token smallest units, rounded up.
    pub usdc_raw: TokenAmount,
    /// Fee, two decimal places for display.
    #[serde_as(as = "DisplayFromStr")]
    pub fee: Decimal,
    /// Converted amount plus fee, two decimal places for display.
    #[serde_as(as = "DisplayFromStr")]
    pub total: Decimal,
    /// Converted amount plus fee in token smallest units, rounded up.
    pub total_raw: TokenAmount,
    /// Exchange rate used.
    #[serde_as(as = "DisplayFromStr")]
    pub eth_price: Decimal,
    /// Caller-supplied service tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

impl Quote {
    /// Tags the quote with the service it was computed for.
    #[must_use]
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }
}

/// Pure quote function over a fixed rate, fee rate and token decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteCalculator {
    rate: Decimal,
    fee_rate: Decimal,
    decimals: u8,
}

impl QuoteCalculator {
    /// Creates a calculator.
    #[must_use]
    pub const fn new(rate: Decimal, fee_rate: Decimal, decimals: u8) -> Self {
        Self {
            rate,
            fee_rate,
            decimals,
        }
    }

    /// Quotes a native amount.
    ///
    /// `usdc = eth * rate`, `fee = usdc * fee_rate`, `total = usdc + fee`.
    /// Raw forms are `ceil(x * 10^decimals)`, computed from the exact values.
    /// Display forms are rounded up to two decimals, so `total` never reads
    /// below `total_raw`.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::Negative`] for negative input and
    /// [`QuoteError::Overflow`] when the result leaves the decimal range.
    pub fn quote(&self, eth_amount: Decimal) -> Result<Quote, QuoteError> {
        if eth_amount.is_sign_negative() && !eth_amount.is_zero() {
            return Err(QuoteError::Negative);
        }
        let usdc = eth_amount
            .checked_mul(self.rate)
            .ok_or(QuoteError::Overflow)?;
        let fee = usdc.checked_mul(self.fee_rate).ok_or(QuoteError::Overflow)?;
        let total = usdc.checked_add(fee).ok_or(QuoteError::Overflow)?;

        Ok(Quote {
            eth_amount: eth_amount.normalize(),
            usdc_amount: display(usdc),
            usdc_raw: self.raw(usdc)?,
            fee: display(fee),
            total: display(total),
            total_raw: self.raw(total)?,
            eth_price: self.rate.normalize(),
            service_type: None,
        })
    }

    /// Quotes an amount given in wei.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::Overflow`] when the amount exceeds the decimal range.
    pub fn quote_wei(&self, wei: U256) -> Result<Quote, QuoteError> {
        self.quote(wei_to_eth(wei)?)
    }

    /// Quotes a decimal string such as `"0.001"`.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::InvalidAmount`] when the string is not a decimal.
    pub fn quote_str(&self, eth_amount: &str) -> Result<Quote, QuoteError> {
        let amount = Decimal::from_str_exact(eth_amount.trim())
            .map_err(|_| QuoteError::InvalidAmount(eth_amount.to_owned()))?;
        self.quote(amount)
    }

    fn raw(&self, amount: Decimal) -> Result<TokenAmount, QuoteError> {
        let scale = 10_u64
            .checked_pow(u32::from(self.decimals))
            .map(Decimal::from)
            .ok_or(QuoteError::Overflow)?;
        let scaled = amount.checked_mul(scale).ok_or(QuoteError::Overflow)?;
        scaled
            .ceil()
            .to_u128()
            .map(TokenAmount::from)
            .ok_or(QuoteError::Overflow)
    }
}

fn display(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

/// Converts wei into ETH without loss.
///
/// # Errors
///
/// Returns [`QuoteError::Overflow`] when the amount exceeds 96 bits.
pub fn wei_to_eth(wei: U256) -> Result<Decimal, QuoteError> {
    let mut eth = Decimal::from_str_exact(&wei.to_string()).map_err(|_| QuoteError::Overflow)?;
    eth.set_scale(NATIVE_DECIMALS)
        .map_err(|_| QuoteError::Overflow)?;
    Ok(eth.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn calculator() -> QuoteCalculator {
        QuoteCalculator::new(Decimal::new(2500, 0), Decimal::new(25, 3), 6)
    }

    #[test]
    fn test_quote_default_price() {
        let quote = calculator().quote_wei(U256::from(1_000_000_000_000_000_u64)).unwrap();
        assert_eq!(quote.eth_amount, Decimal::from_str("0.001").unwrap());
        assert_eq!(quote.usdc_amount, Decimal::from_str("2.50").unwrap());
        assert_eq!(quote.usdc_raw, TokenAmount::from(2_500_000_u64));
        assert_eq!(quote.fee, Decimal::from_str("0.07").unwrap());
        assert_eq!(quote.total, Decimal::from_str("2.57").unwrap());
        // 2.5625 USDC exactly.
        assert_eq!(quote.total_raw, TokenAmount::from(2_562_500_u64));
    }

    #[test]
    fn test_quote_zero() {
        let quote = calculator().quote(Decimal::ZERO).unwrap();
        assert!(quote.usdc_amount.is_zero());
        assert!(quote.fee.is_zero());
        assert!(quote.total.is_zero());
        assert_eq!(quote.usdc_raw, TokenAmount::ZERO);
        assert_eq!(quote.total_raw, TokenAmount::ZERO);
    }

    #[test]
    fn test_raw_rounds_up() {
        // 1 wei -> 2.5e-15 USDC: tiny, but never quoted as zero.
        let quote = calculator().quote_wei(U256::from(1_u64)).unwrap();
        assert_eq!(quote.usdc_raw, TokenAmount::from(1_u64));
        assert_eq!(quote.total_raw, TokenAmount::from(1_u64));
    }

    #[test]
    fn test_total_raw_never_below_exact_product() {
        let calc = calculator();
        let factor = Decimal::new(2500, 0) * (Decimal::ONE + Decimal::new(25, 3));
        let mut previous = TokenAmount::ZERO;
        for micro in [1_u64, 7, 333, 1_000, 123_457, 999_999, 1_000_001, 42_000_000] {
            let eth = Decimal::new(i64::try_from(micro).unwrap(), 6);
            let quote = calc.quote(eth).unwrap();
            let exact = (eth * factor * Decimal::from(1_000_000_u64)).ceil();
            let exact = TokenAmount::from(exact.to_u128().unwrap());
            assert!(quote.total_raw >= exact);
            assert!(quote.total_raw >= previous);
            previous = quote.total_raw;
        }
    }

    #[test]
    fn test_display_total_covers_raw_total() {
        let calc = calculator();
        for amount in ["0.000998", "0.001", "0.0123456", "1.999999"] {
            let quote = calc.quote_str(amount).unwrap();
            let shown = quote.total * Decimal::from(1_000_000_u64);
            let shown = TokenAmount::from(shown.to_u128().unwrap());
            assert!(shown >= quote.total_raw, "{amount}: {} < {}", quote.total, quote.total_raw);
        }
        let quote = calc.quote_str("0.000998").unwrap();
        assert_eq!(quote.total, Decimal::from_str("2.56").unwrap());
        assert_eq!(quote.total_raw, TokenAmount::from(2_557_375_u64));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert_eq!(
            calculator().quote(Decimal::new(-1, 3)).unwrap_err(),
            QuoteError::Negative
        );
        assert!(matches!(
            calculator().quote_str("abc"),
            Err(QuoteError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_serializes_camel_case_strings() {
        let quote = calculator()
            .quote_str("0.001")
            .unwrap()
            .with_service_type("premium");
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["totalRaw"], "2562500");
        assert_eq!(json["usdcAmount"], "2.50");
        assert_eq!(json["serviceType"], "premium");
        assert_eq!(json["ethPrice"], "2500");
    }
}
