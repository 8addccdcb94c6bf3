//! Wallet-facing EIP-712 typed data.
//!
//! Browser wallets sign `{domain, types, primaryType, message}` documents
//! and clients send the same document back. This module parses those
//! documents, checks that the schema they carry is the one the gate hashes,
//! and builds them for clients that ask what to sign.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Formatter};

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use rand::Rng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use u402::amount::TokenAmount;
use u402::config::PaymentConfig;
use u402::proto::{AuthorizationMessage, TraditionalPaymentMessage};
use u402::timestamp::{UnixMillis, UnixTimestamp};

use crate::types::{Payment, TransferWithAuthorization};

/// Name of the implicit domain type, which wallets may include in `types`.
pub const EIP712_DOMAIN_TYPE: &str = "EIP712Domain";

/// Primary type of gasless authorizations.
pub const TRANSFER_WITH_AUTHORIZATION_TYPE: &str = "TransferWithAuthorization";

/// Primary type of traditional payments.
pub const PAYMENT_TYPE: &str = "Payment";

/// The typed data document does not describe the expected message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypedDataError {
    /// `primaryType` names something other than the expected struct.
    #[error("unexpected primary type {0:?}")]
    UnexpectedPrimaryType(String),
    /// The expected struct is absent from `types`.
    #[error("missing type definition for {0}")]
    MissingType(&'static str),
    /// `types` declares more than the expected struct.
    #[error("unexpected type definitions: {0:?}")]
    UnexpectedTypes(Vec<String>),
    /// The declared fields differ from the expected struct.
    #[error("type schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Canonical `encodeType` of the expected struct.
        expected: String,
        /// `encodeType` rendered from the document.
        found: String,
    },
}

/// One field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataField {
    /// Field name.
    pub name: String,
    /// Solidity type name.
    #[serde(rename = "type")]
    pub ty: String,
}

/// Struct types of a typed data document, keyed by struct name.
pub type TypedDataTypes = BTreeMap<String, Vec<TypedDataField>>;

/// EIP-712 domain as wallets serialize it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    /// Domain name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Domain version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// EIP-155 chain id; accepted as a number, a decimal or a hex string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_chain_id"
    )]
    pub chain_id: Option<u64>,
    /// Verifying contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<Address>,
}

impl TypedDataDomain {
    /// The domain used for hashing.
    #[must_use]
    pub fn to_eip712(&self) -> Eip712Domain {
        Eip712Domain::new(
            self.name.clone().map(Cow::Owned),
            self.version.clone().map(Cow::Owned),
            self.chain_id.map(U256::from),
            self.verifying_contract,
            None,
        )
    }
}

fn deserialize_chain_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    struct ChainIdVisitor;

    impl<'de> Visitor<'de> for ChainIdVisitor {
        type Value = Option<u64>;

        fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str("a chain id as number or string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(self)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(Some)
                .map_err(|_| E::custom("chain id must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            let parsed = match v.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => v.parse(),
            };
            parsed
                .map(Some)
                .map_err(|_| E::custom(format!("invalid chain id {v:?}")))
        }
    }

    deserializer.deserialize_option(ChainIdVisitor)
}

/// Splits a canonical single-struct `encodeType` into its field list.
fn schema_of(encode_type: &str) -> Vec<TypedDataField> {
    let fields = encode_type
        .split_once('(')
        .map_or("", |(_, rest)| rest.trim_end_matches(')'));
    fields
        .split(',')
        .filter_map(|field| field.split_once(' '))
        .map(|(ty, name)| TypedDataField {
            name: name.to_owned(),
            ty: ty.to_owned(),
        })
        .collect()
}

fn render_encode_type(name: &str, fields: &[TypedDataField]) -> String {
    let fields: Vec<String> = fields
        .iter()
        .map(|field| format!("{} {}", field.ty, field.name))
        .collect();
    format!("{name}({})", fields.join(","))
}

/// Checks that `types` declares exactly `primary` with `encode_type`,
/// ignoring the implicit domain type.
fn check_schema(
    types: &TypedDataTypes,
    primary_type: Option<&str>,
    primary: &'static str,
    encode_type: &str,
) -> Result<(), TypedDataError> {
    if let Some(declared) = primary_type
        && declared != primary
    {
        return Err(TypedDataError::UnexpectedPrimaryType(declared.to_owned()));
    }
    let extra: Vec<String> = types
        .keys()
        .filter(|name| *name != primary && *name != EIP712_DOMAIN_TYPE)
        .cloned()
        .collect();
    if !extra.is_empty() {
        return Err(TypedDataError::UnexpectedTypes(extra));
    }
    let fields = types.get(primary).ok_or(TypedDataError::MissingType(primary))?;
    let found = render_encode_type(primary, fields);
    if found == encode_type {
        Ok(())
    } else {
        Err(TypedDataError::SchemaMismatch {
            expected: encode_type.to_owned(),
            found,
        })
    }
}

/// A gasless authorization as signed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedAuthorization {
    /// Domain the payer signed against.
    pub domain: TypedDataDomain,
    /// Declared struct types.
    pub types: TypedDataTypes,
    /// Declared primary type, optional on input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_type: Option<String>,
    /// The authorization itself.
    pub message: AuthorizationMessage,
}

impl TypedAuthorization {
    /// Ensures the document describes a `TransferWithAuthorization`.
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError`] when the declared types differ.
    pub fn check_schema(&self) -> Result<(), TypedDataError> {
        check_schema(
            &self.types,
            self.primary_type.as_deref(),
            TRANSFER_WITH_AUTHORIZATION_TYPE,
            &TransferWithAuthorization::eip712_encode_type(),
        )
    }

    /// EIP-712 digest of the message under its embedded domain.
    ///
    /// # Errors
    ///
    /// Returns [`TypedDataError`] when the declared types differ.
    pub fn signing_hash(&self) -> Result<B256, TypedDataError> {
        self.check_schema()?;
        let domain = self.domain.to_eip712();
        Ok(TransferWithAuthorization::from(&self.message).eip712_signing_hash(&domain))
    }
}

/// JSON body of the `X-402-Payment` header in gasless mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessPaymentHeader {
    /// Signed typed data document.
    pub authorization: TypedAuthorization,
    /// Signature over it.
    pub signature: Bytes,
    /// Marketplace task the payment is for, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<serde_json::Value>,
    /// Marketplace agent the payment is for, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<serde_json::Value>,
}

/// A traditional payment document for the wallet to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedPaymentMessage {
    /// Marketplace domain.
    pub domain: TypedDataDomain,
    /// The `Payment` type.
    pub types: TypedDataTypes,
    /// Always `Payment`.
    pub primary_type: String,
    /// Message to sign.
    #[serde(rename = "value")]
    pub message: TraditionalPaymentMessage,
}

fn typed_domain(name: &str, version: &str, chain_id: u64, verifying_contract: Address) -> TypedDataDomain {
    TypedDataDomain {
        name: Some(name.to_owned()),
        version: Some(version.to_owned()),
        chain_id: Some(chain_id),
        verifying_contract: Some(verifying_contract),
    }
}

/// Builds the authorization a payer must sign to pay `amount` gaslessly.
///
/// `validAfter` is zero, `validBefore` is now plus the configured validity
/// and the nonce is 32 fresh random bytes.
#[must_use]
pub fn authorization_request(
    config: &PaymentConfig,
    payer: Address,
    amount: TokenAmount,
) -> TypedAuthorization {
    let nonce: [u8; 32] = rand::rng().random();
    let valid_before = UnixTimestamp::now() + config.authorization_validity.as_secs();
    TypedAuthorization {
        domain: typed_domain(
            &config.token.eip712.name,
            &config.token.eip712.version,
            config.chain_id,
            config.token.address,
        ),
        types: BTreeMap::from([(
            TRANSFER_WITH_AUTHORIZATION_TYPE.to_owned(),
            schema_of(&TransferWithAuthorization::eip712_encode_type()),
        )]),
        primary_type: Some(TRANSFER_WITH_AUTHORIZATION_TYPE.to_owned()),
        message: AuthorizationMessage {
            from: payer,
            to: config.recipient,
            value: amount,
            valid_after: UnixTimestamp::from_secs(0),
            valid_before,
            nonce: B256::from(nonce),
        },
    }
}

/// Builds the traditional payment document a payer must sign.
#[must_use]
pub fn payment_message(
    config: &PaymentConfig,
    payer: Address,
    amount: TokenAmount,
    nonce: TokenAmount,
    timestamp: UnixMillis,
) -> TypedPaymentMessage {
    TypedPaymentMessage {
        domain: typed_domain(
            &config.marketplace_domain.name,
            &config.marketplace_domain.version,
            config.chain_id,
            config.recipient,
        ),
        types: BTreeMap::from([(
            PAYMENT_TYPE.to_owned(),
            schema_of(&Payment::eip712_encode_type()),
        )]),
        primary_type: PAYMENT_TYPE.to_owned(),
        message: TraditionalPaymentMessage {
            payer,
            recipient: config.recipient,
            amount,
            nonce,
            timestamp,
        },
    }
}
