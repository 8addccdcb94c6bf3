//! ECDSA recovery over EIP-712 digests.
//!
//! A signature is valid when the address it recovers to equals the claimed
//! payer. Every failure (wrong length, bad recovery id, schema mismatch)
//! reads as "invalid" and never as an error: a malformed signature must not
//! crash the request path.

use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_sol_types::{Eip712Domain, SolStruct};
use u402::proto::TraditionalPaymentMessage;

use crate::typed_data::TypedAuthorization;
use crate::types::Payment;

/// Checks payment signatures for both modes.
pub trait PaymentSignatureVerifier: Send + Sync {
    /// Whether `signature` over the marketplace `Payment` under `domain`
    /// recovers to `message.payer`.
    fn verify_payment(
        &self,
        domain: &Eip712Domain,
        message: &TraditionalPaymentMessage,
        signature: &Bytes,
    ) -> bool;

    /// Whether `signature` over the authorization, under the domain it
    /// embeds, recovers to its `from` address.
    fn verify_authorization(&self, authorization: &TypedAuthorization, signature: &Bytes) -> bool;
}

/// Parses a 65-byte `r || s || v` or a 64-byte ERC-2098 compact signature.
#[must_use]
pub fn parse_signature(bytes: &[u8]) -> Option<Signature> {
    match bytes.len() {
        65 => Signature::from_raw(bytes).ok(),
        64 => Some(Signature::from_erc2098(bytes)),
        _ => None,
    }
}

/// Address that signed `digest`, if the signature is well formed.
#[must_use]
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Option<Address> {
    parse_signature(signature)?
        .recover_address_from_prehash(digest)
        .ok()
}

fn recovers_to(digest: &B256, signature: &[u8], expected: Address) -> bool {
    let recovered = recover_signer(digest, signature);
    #[cfg(feature = "telemetry")]
    tracing::trace!(?recovered, %expected, "recovered signer");
    recovered == Some(expected)
}

/// Local EOA verifier.
///
/// Contract wallets (EIP-1271) are not supported: their signatures do not
/// recover to the wallet address and are reported invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip712Verifier;

impl PaymentSignatureVerifier for Eip712Verifier {
    fn verify_payment(
        &self,
        domain: &Eip712Domain,
        message: &TraditionalPaymentMessage,
        signature: &Bytes,
    ) -> bool {
        let digest = Payment::from(message).eip712_signing_hash(domain);
        recovers_to(&digest, signature, message.payer)
    }

    fn verify_authorization(&self, authorization: &TypedAuthorization, signature: &Bytes) -> bool {
        match authorization.signing_hash() {
            Ok(digest) => recovers_to(&digest, signature, authorization.message.from),
            Err(error) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(%error, "authorization schema rejected");
                #[cfg(not(feature = "telemetry"))]
                let _ = error;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_data::authorization_request;
    use crate::types::marketplace_domain;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use u402::amount::TokenAmount;
    use u402::config::PaymentConfig;
    use u402::timestamp::UnixMillis;

    fn config() -> PaymentConfig {
        PaymentConfig {
            recipient: "0x2222222222222222222222222222222222222222".parse().unwrap(),
            ..PaymentConfig::default()
        }
    }

    fn traditional(payer: Address, config: &PaymentConfig) -> TraditionalPaymentMessage {
        TraditionalPaymentMessage {
            payer,
            recipient: config.recipient,
            amount: TokenAmount::from(1_000_000_000_000_000_u64),
            nonce: TokenAmount::from(42_u64),
            timestamp: UnixMillis::from_millis(1_700_000_000_000),
        }
    }

    fn sign(signer: &PrivateKeySigner, digest: &B256) -> Bytes {
        let signature = signer.sign_hash_sync(digest).unwrap();
        Bytes::from(signature.as_bytes().to_vec())
    }

    #[test]
    fn test_traditional_signature_roundtrip() {
        let signer = PrivateKeySigner::random();
        let config = config();
        let domain = marketplace_domain(&config);
        let message = traditional(signer.address(), &config);
        let signature = sign(&signer, &Payment::from(&message).eip712_signing_hash(&domain));

        assert!(Eip712Verifier.verify_payment(&domain, &message, &signature));

        let tampered = TraditionalPaymentMessage {
            amount: TokenAmount::from(1_u64),
            ..message
        };
        assert!(!Eip712Verifier.verify_payment(&domain, &tampered, &signature));
    }

    #[test]
    fn test_wrong_domain_fails_silently() {
        let signer = PrivateKeySigner::random();
        let config = config();
        let message = traditional(signer.address(), &config);
        let signature = sign(
            &signer,
            &Payment::from(&message).eip712_signing_hash(&marketplace_domain(&config)),
        );
        let other = PaymentConfig {
            chain_id: 8453,
            ..config
        };
        assert!(!Eip712Verifier.verify_payment(&marketplace_domain(&other), &message, &signature));
    }

    #[test]
    fn test_malformed_signatures_are_invalid() {
        let config = config();
        let domain = marketplace_domain(&config);
        let message = traditional(Address::ZERO, &config);
        for bytes in [vec![], vec![0_u8; 10], vec![0_u8; 65], vec![0xff_u8; 66]] {
            assert!(!Eip712Verifier.verify_payment(&domain, &message, &Bytes::from(bytes)));
        }
    }

    #[test]
    fn test_authorization_signature_and_tampering() {
        let signer = PrivateKeySigner::random();
        let config = config();
        let mut authorization =
            authorization_request(&config, signer.address(), TokenAmount::from(2_562_500_u64));
        let signature = sign(&signer, &authorization.signing_hash().unwrap());

        assert!(Eip712Verifier.verify_authorization(&authorization, &signature));

        authorization.message.value = TokenAmount::from(1_u64);
        assert!(!Eip712Verifier.verify_authorization(&authorization, &signature));
    }

    #[test]
    fn test_payer_address_case_is_irrelevant() {
        let signer = PrivateKeySigner::random();
        let config = config();
        let lower: Address = signer
            .address()
            .to_string()
            .to_lowercase()
            .parse()
            .unwrap();
        let message = traditional(lower, &config);
        let domain = marketplace_domain(&config);
        let signature = sign(&signer, &Payment::from(&message).eip712_signing_hash(&domain));
        assert!(Eip712Verifier.verify_payment(&domain, &message, &signature));
    }

    #[test]
    fn test_compact_signature_is_accepted() {
        let signer = PrivateKeySigner::random();
        let digest = B256::repeat_byte(7);
        let signature = signer.sign_hash_sync(&digest).unwrap();
        let compact = signature.as_erc2098();
        assert_eq!(recover_signer(&digest, &compact), Some(signer.address()));
    }
}
