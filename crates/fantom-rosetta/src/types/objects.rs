// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Objects used by the Rosetta construction and network APIs
//!
//! [Spec](https://www.rosetta-api.org/docs/api_objects.html)

use crate::{
    common::{is_native_coin, native_coin},
    error::{ApiError, ApiResult},
    types::{
        AccountIdentifier, Catalog, Error, OperationIdentifier, OperationStatus, OperationType,
    },
};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// A description of all types used by the Rosetta implementation.
///
/// This is used to verify correctness of the implementation and to check things like
/// operation names, and error names.
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Allow.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Allow {
    /// List of all possible operation statuses
    pub operation_statuses: Vec<OperationStatus>,
    /// List of all possible operation types
    pub operation_types: Vec<String>,
    /// List of all possible errors
    pub errors: Vec<Error>,
    /// If the server is allowed to lookup historical transactions
    pub historical_balance_lookup: bool,
    /// All call methods supported
    pub call_methods: Vec<String>,
    /// A list of balance exemptions.  These should be as minimal as possible, otherwise it becomes
    /// more complicated for users
    pub balance_exemptions: Vec<BalanceExemption>,
    /// Determines if mempool can change the balance on an account
    /// This should be set to false
    pub mempool_coins: bool,
}

impl Allow {
    pub fn new(catalog: &Catalog, errors: Vec<Error>) -> Allow {
        Allow {
            operation_statuses: catalog
                .operation_statuses
                .iter()
                .map(|status| (*status).into())
                .collect(),
            operation_types: catalog
                .operation_types
                .iter()
                .map(|op| op.to_string())
                .collect(),
            errors,
            historical_balance_lookup: catalog.historical_balance_lookup,
            call_methods: catalog.call_methods.clone(),
            balance_exemptions: vec![],
            mempool_coins: catalog.mempool_coins,
        }
    }
}

/// Amount of a [`Currency`] in atomic units
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Amount.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Amount {
    /// Value of transaction as a String representation of an integer
    pub value: String,
    /// [`Currency`]
    pub currency: Currency,
}

impl Amount {
    /// Fee for a transaction paying `gas_price` per unit for `gas_limit` units, in wei
    pub fn suggested_fee(gas_price: U256, gas_limit: U256) -> ApiResult<Amount> {
        let fee = gas_price
            .checked_mul(gas_limit)
            .ok_or_else(|| ApiError::InvalidInput(Some("Fee overflows".to_string())))?;
        Ok(Amount {
            value: fee.to_string(),
            currency: native_coin(),
        })
    }

    /// Native amount with an explicit sign
    pub fn signed(value: U256, negative: bool) -> Amount {
        let value = if negative && !value.is_zero() {
            format!("-{}", value)
        } else {
            value.to_string()
        };
        Amount {
            value,
            currency: native_coin(),
        }
    }

    /// Splits the value into its sign and magnitude
    ///
    /// Values are arbitrary precision integers in the API, so they're parsed into a
    /// [`U256`] rather than a machine integer.
    pub fn value(&self) -> ApiResult<(bool, U256)> {
        let (negative, magnitude) = match self.value.strip_prefix('-') {
            Some(magnitude) => (true, magnitude),
            None => (false, self.value.as_str()),
        };
        if magnitude.is_empty() || !magnitude.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(ApiError::InvalidTransferOperations(Some(
                "Amount is not an integer",
            )));
        }
        let magnitude = U256::from_dec_str(magnitude)
            .map_err(|_| ApiError::InvalidTransferOperations(Some("Amount is out of range")))?;
        Ok((negative && !magnitude.is_zero(), magnitude))
    }
}

/// [API Spec](https://www.rosetta-api.org/docs/models/BalanceExemption.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BalanceExemption {}

/// Currency represented as atomic units including decimals
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Currency.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Currency {
    /// Symbol of currency
    pub symbol: String,
    /// Number of decimals to be considered in the currency
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Various signing curves supported by Rosetta.  We only use [`CurveType::Secp256k1`]
/// [API Spec](https://www.rosetta-api.org/docs/models/CurveType.html)
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveType {
    Secp256k1,
    Secp256k1Bip340,
    Secp256r1,
    Edwards25519,
    Tweedle,
    Pallas,
}

/// A representation of a single account change in a transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Operation.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Operation {
    /// Identifier of an operation within a transaction
    pub operation_identifier: OperationIdentifier,
    /// Operations this one depends on, e.g. the credit side of a transfer points at the debit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_operations: Option<Vec<OperationIdentifier>>,
    /// Type of operation
    #[serde(rename = "type")]
    pub operation_type: String,
    /// Status of operation.  Must be populated if the transaction is in the past.  If submitting
    /// new transactions, it must NOT be populated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// AccountIdentifier should be provided to point at which account the change is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountIdentifier>,
    /// Amount in the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Operation {
    fn new(
        operation_type: OperationType,
        operation_index: u64,
        related_operations: Option<Vec<OperationIdentifier>>,
        account: Address,
        amount: Amount,
    ) -> Operation {
        Operation {
            operation_identifier: operation_index.into(),
            related_operations,
            operation_type: operation_type.to_string(),
            status: None,
            account: Some(account.into()),
            amount: Some(amount),
            metadata: None,
        }
    }

    /// Value leaving `sender` in a plain transfer
    pub fn debit(operation_index: u64, sender: Address, value: U256) -> Operation {
        Operation::new(
            OperationType::Call,
            operation_index,
            None,
            sender,
            Amount::signed(value, true),
        )
    }

    /// Value arriving at `receiver`, linked back to the debit
    pub fn credit(
        operation_index: u64,
        debit_index: u64,
        receiver: Address,
        value: U256,
    ) -> Operation {
        Operation::new(
            OperationType::Call,
            operation_index,
            Some(vec![debit_index.into()]),
            receiver,
            Amount::signed(value, false),
        )
    }

    pub fn account(&self) -> Option<&AccountIdentifier> {
        self.account.as_ref()
    }

    pub fn currency(&self) -> Option<&Currency> {
        self.amount.as_ref().map(|inner| &inner.currency)
    }
}

/// Public key used for the rosetta implementation.  All private keys will never be handled
/// in the Rosetta implementation.
///
/// [API Spec](https://www.rosetta-api.org/docs/models/PublicKey.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublicKey {
    /// Hex encoded public key bytes, compressed or uncompressed SEC1
    pub hex_bytes: String,
    /// Curve type associated with the key
    pub curve_type: CurveType,
}

/// Signature containing the signed payload and the encoded signed payload
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Signature.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Signature {
    /// Payload to be signed
    pub signing_payload: SigningPayload,
    /// Public key related to the signature
    pub public_key: PublicKey,
    /// Cryptographic signature type
    pub signature_type: SignatureType,
    /// Hex bytes of the signature, `r || s || v`
    pub hex_bytes: String,
}

/// Cryptographic signature type used for signing transactions.  Opera only accepts
/// [`SignatureType::EcdsaRecovery`]
///
/// [API Spec](https://www.rosetta-api.org/docs/models/SignatureType.html)
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    Ecdsa,
    EcdsaRecovery,
    Ed25519,
    #[serde(rename = "schnorr_1")]
    Schnorr1,
    SchnorrBip340,
    SchnorrPoseidon,
}

/// Signing payload should be signed by the client with their own private key
///
/// [API Spec](https://www.rosetta-api.org/docs/models/SigningPayload.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SigningPayload {
    /// Deprecated address of the signer, kept for older clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Hex encoded string of payload bytes to be signed
    pub hex_bytes: String,
    /// Account identifier of the signer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_identifier: Option<AccountIdentifier>,
    /// Signature type to sign with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_type: Option<SignatureType>,
}

impl SigningPayload {
    pub fn ecdsa_recovery(signer: Address, hash: &[u8; 32]) -> SigningPayload {
        let account = AccountIdentifier::from(signer);
        SigningPayload {
            address: Some(account.address.clone()),
            hex_bytes: hex::encode(hash),
            account_identifier: Some(account),
            signature_type: Some(SignatureType::EcdsaRecovery),
        }
    }
}

/// Operation to transfer native coins between accounts
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub currency: Currency,
}

impl Transfer {
    pub fn extract_transfer(
        catalog: &Catalog,
        operations: &[Operation],
    ) -> ApiResult<Transfer> {
        // Only support 1:1 P2P transfer
        // This is composed of a debit and a credit CALL operation
        if operations.len() != 2 {
            return Err(ApiError::InvalidTransferOperations(Some(
                "Must have exactly 2 operations a debit and a credit",
            )));
        }

        let mut debit = None;
        let mut credit = None;
        for op in operations {
            if catalog.operation_type(&op.operation_type) != Some(OperationType::Call) {
                return Err(ApiError::InvalidTransferOperations(Some(
                    "Operations must be of type CALL",
                )));
            }

            let (account, amount) = match (&op.account, &op.amount) {
                (Some(account), Some(amount)) => (account, amount),
                _ => {
                    return Err(ApiError::InvalidTransferOperations(Some(
                        "Operations must have an account and an amount",
                    )))
                },
            };

            let address = account.account_address()?;
            let (negative, value) = amount.value()?;
            let slot = if negative { &mut debit } else { &mut credit };
            if slot.is_some() {
                return Err(ApiError::InvalidTransferOperations(Some(
                    "Must have one negative and one positive amount",
                )));
            }
            *slot = Some((address, value, &amount.currency));
        }

        let (sender, debit_value, debit_currency) = debit.ok_or(
            ApiError::InvalidTransferOperations(Some("Must have a debit")),
        )?;
        let (receiver, credit_value, credit_currency) = credit.ok_or(
            ApiError::InvalidTransferOperations(Some("Must have a credit")),
        )?;

        // Currencies have to be the same
        if debit_currency != credit_currency {
            return Err(ApiError::InvalidTransferOperations(Some(
                "Currency mismatch between debit and credit",
            )));
        }
        is_native_coin(credit_currency)?;

        // We can't create or destroy coins, they must be negatives of each other
        if debit_value != credit_value {
            return Err(ApiError::InvalidTransferOperations(Some(
                "Debit amount must be equal to negative of credit amount",
            )));
        }

        Ok(Transfer {
            sender,
            receiver,
            amount: credit_value,
            currency: credit_currency.clone(),
        })
    }
}
