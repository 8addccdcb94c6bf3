//! Solidity struct definitions and EIP-712 domains.
//!
//! Two typed-data messages are signed by UltraMarket payers:
//!
//! - [`TransferWithAuthorization`]: ERC-3009 authorization over the
//!   settlement token, signed against the token's own domain.
//! - [`Payment`]: marketplace payment over an ETH amount, signed against the
//!   `UltraMarket` domain whose verifying contract is the recipient.

use alloy_primitives::U256;
use alloy_sol_types::{Eip712Domain, eip712_domain, sol};
use u402::config::PaymentConfig;
use u402::proto::{AuthorizationMessage, TraditionalPaymentMessage};

sol!(
    /// ERC-3009 `transferWithAuthorization` parameters.
    ///
    /// Field order and types must match the token contract exactly, or the
    /// recovered signer will not be the payer.
    #[derive(Debug, PartialEq, Eq)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

sol!(
    /// Marketplace payment signed in traditional mode.
    #[derive(Debug, PartialEq, Eq)]
    struct Payment {
        address payer;
        address recipient;
        uint256 amount;
        uint256 nonce;
        uint256 timestamp;
    }
);

impl From<&AuthorizationMessage> for TransferWithAuthorization {
    fn from(message: &AuthorizationMessage) -> Self {
        Self {
            from: message.from,
            to: message.to,
            value: message.value.inner(),
            validAfter: U256::from(message.valid_after.as_secs()),
            validBefore: U256::from(message.valid_before.as_secs()),
            nonce: message.nonce,
        }
    }
}

impl From<&TraditionalPaymentMessage> for Payment {
    fn from(message: &TraditionalPaymentMessage) -> Self {
        Self {
            payer: message.payer,
            recipient: message.recipient,
            amount: message.amount.inner(),
            nonce: message.nonce.inner(),
            timestamp: U256::from(message.timestamp.as_millis()),
        }
    }
}

/// Domain of traditional marketplace payments.
#[must_use]
pub fn marketplace_domain(config: &PaymentConfig) -> Eip712Domain {
    eip712_domain! {
        name: config.marketplace_domain.name.clone(),
        version: config.marketplace_domain.version.clone(),
        chain_id: config.chain_id,
        verifying_contract: config.recipient,
    }
}

/// Domain of the settlement token, as gasless authorizations are signed.
#[must_use]
pub fn token_domain(config: &PaymentConfig) -> Eip712Domain {
    eip712_domain! {
        name: config.token.eip712.name.clone(),
        version: config.token.eip712.version.clone(),
        chain_id: config.chain_id,
        verifying_contract: config.token.address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolStruct;

    #[test]
    fn test_encode_types_match_wallet_schemas() {
        assert_eq!(
            TransferWithAuthorization::eip712_encode_type(),
            "TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)"
        );
        assert_eq!(
            Payment::eip712_encode_type(),
            "Payment(address payer,address recipient,uint256 amount,uint256 nonce,uint256 timestamp)"
        );
    }

    #[test]
    fn test_domains_follow_config() {
        let config = PaymentConfig::default();
        let marketplace = marketplace_domain(&config);
        assert_eq!(marketplace.name.as_deref(), Some("UltraMarket"));
        assert_eq!(marketplace.verifying_contract, Some(config.recipient));
        let token = token_domain(&config);
        assert_eq!(token.name.as_deref(), Some("USDC"));
        assert_eq!(token.version.as_deref(), Some("2"));
        assert_eq!(token.chain_id, Some(U256::from(84532_u64)));
        assert_eq!(token.verifying_contract, Some(config.token.address));
    }
}
