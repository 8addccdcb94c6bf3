//! Client-side signing of payment headers.
//!
//! Agents that pay for marketplace work programmatically use these helpers
//! to produce the `X-402-Payment` header bodies a browser wallet would.

use alloy_primitives::Bytes;
use alloy_signer::{Signer, SignerSync};
use alloy_sol_types::SolStruct;
use u402::amount::TokenAmount;
use u402::config::PaymentConfig;
use u402::proto::TraditionalPaymentHeader;
use u402::timestamp::UnixMillis;

use crate::typed_data::{GaslessPaymentHeader, TypedDataError, authorization_request};
use crate::types::{Payment, marketplace_domain};

/// Errors produced while signing a payment.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The signer refused or failed.
    #[error("signing failed: {0}")]
    Signer(#[from] alloy_signer::Error),
    /// The document to sign was inconsistent.
    #[error(transparent)]
    TypedData(#[from] TypedDataError),
}

/// Signs a traditional marketplace payment of `amount` wei, stamped now.
///
/// The payer is the signer's address; send it as `X-402-Payer`.
///
/// # Errors
///
/// Returns [`SigningError::Signer`] when signing fails.
pub fn sign_traditional<S: Signer + SignerSync>(
    signer: &S,
    config: &PaymentConfig,
    amount: TokenAmount,
    nonce: TokenAmount,
) -> Result<TraditionalPaymentHeader, SigningError> {
    let header = TraditionalPaymentHeader {
        signature: Bytes::new(),
        amount,
        nonce,
        timestamp: UnixMillis::now(),
    };
    let message = header.message(Signer::address(signer), config.recipient);
    let digest = Payment::from(&message).eip712_signing_hash(&marketplace_domain(config));
    let signature = signer.sign_hash_sync(&digest)?;
    Ok(TraditionalPaymentHeader {
        signature: Bytes::from(signature.as_bytes().to_vec()),
        ..header
    })
}

/// Builds and signs a fresh gasless authorization for `amount` token units.
///
/// # Errors
///
/// Returns [`SigningError`] when signing fails.
pub fn sign_gasless<S: Signer + SignerSync>(
    signer: &S,
    config: &PaymentConfig,
    amount: TokenAmount,
) -> Result<GaslessPaymentHeader, SigningError> {
    let authorization = authorization_request(config, Signer::address(signer), amount);
    let digest = authorization.signing_hash()?;
    let signature = signer.sign_hash_sync(&digest)?;
    Ok(GaslessPaymentHeader {
        authorization,
        signature: Bytes::from(signature.as_bytes().to_vec()),
        task_id: None,
        agent_id: None,
    })
}
