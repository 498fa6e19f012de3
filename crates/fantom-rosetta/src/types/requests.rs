// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    types::{
        AccountIdentifier, Allow, Amount, BlockIdentifier, NetworkIdentifier, Operation, Peer,
        PublicKey, Signature, SigningPayload, SyncStatus, TransactionIdentifier, Version,
    },
    TRANSFER_GAS_LIMIT,
};
use ethers::types::{U256, U64};
use serde::{Deserialize, Serialize};

/// Request to derive an account address from a public key
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionDeriveRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionDeriveRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Public key to derive an address from
    pub public_key: PublicKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Response with the account address derived from a public key
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionDeriveResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionDeriveResponse {
    /// Account identifier of the account derived from the public key
    pub account_identifier: Option<AccountIdentifier>,
}

/// Request to preprocess a set of operations
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionPreprocessRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionPreprocessRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Operations that make up a transfer
    pub operations: Vec<Operation>,
    /// Optional overrides for the fee and sequence of the transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PreprocessMetadata>,
}

/// Overrides a client may set on preprocess instead of asking the node
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PreprocessMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U64>,
}

/// Response from preprocess, the options are handed to `/construction/metadata`
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionPreprocessResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionPreprocessResponse {
    /// Options to be sent directly to `/construction/metadata`
    pub options: Option<ConstructionOptions>,
    /// Public keys required for signing, none are needed with recoverable signatures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_public_keys: Option<Vec<AccountIdentifier>>,
}

/// Everything the metadata stage needs to look up on the node
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionOptions {
    /// Checksummed sender address
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U64>,
}

/// Request to get the on-chain values needed to build the transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionMetadataRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionMetadataRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Options from `/construction/preprocess`
    pub options: Option<ConstructionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_keys: Option<Vec<PublicKey>>,
}

/// Response with the values needed to build the transaction and its fee
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionMetadataResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionMetadataResponse {
    pub metadata: ConstructionMetadata,
    pub suggested_fee: Option<Vec<Amount>>,
}

/// Sequence and fee values of a transaction, passed from metadata to payloads
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionMetadata {
    pub nonce: U64,
    pub gas_price: U256,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: U256,
}

fn default_gas_limit() -> U256 {
    U256::from(TRANSFER_GAS_LIMIT)
}

/// Request to build the unsigned transaction and its signing payloads
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionPayloadsRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionPayloadsRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// The set of operations that make up the transfer
    pub operations: Vec<Operation>,
    /// Metadata from `/construction/metadata`, required to build the transaction
    pub metadata: Option<ConstructionMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_keys: Option<Vec<PublicKey>>,
}

/// Response with the unsigned transaction and what has to be signed
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionPayloadsResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionPayloadsResponse {
    /// Unsigned transaction JSON
    pub unsigned_transaction: String,
    /// Payloads describing what to sign, and by whom
    pub payloads: Vec<SigningPayload>,
}

/// Request to combine the unsigned transaction with signatures
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionCombineRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionCombineRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Unsigned transaction JSON from `/construction/payloads`
    pub unsigned_transaction: String,
    /// Set of signatures to combine, exactly one for a transfer
    pub signatures: Vec<Signature>,
}

/// Response with the signed transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionCombineResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionCombineResponse {
    /// Signed transaction JSON
    pub signed_transaction: String,
}

/// Request to parse a signed or unsigned transaction back into operations
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionParseRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionParseRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Whether `transaction` is signed or unsigned
    pub signed: bool,
    /// Unsigned or signed transaction JSON
    pub transaction: String,
}

/// Response with the operations the transaction is made of
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionParseResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionParseResponse {
    /// The operations in the transaction
    pub operations: Vec<Operation>,
    /// The signers of the transaction, only populated for signed transactions
    pub account_identifier_signers: Option<Vec<AccountIdentifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ParseMetadata>,
}

/// Values of the transaction that aren't represented by operations
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParseMetadata {
    pub nonce: U64,
    pub gas_price: U256,
    pub chain_id: U64,
}

/// Request to hash a signed transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionHashRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionHashRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Signed transaction JSON
    pub signed_transaction: String,
}

/// Request to submit a signed transaction to the node
///
/// [API Spec](https://www.rosetta-api.org/docs/models/ConstructionSubmitRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConstructionSubmitRequest {
    /// Network identifier describing the blockchain and the chain id
    pub network_identifier: NetworkIdentifier,
    /// Signed transaction JSON from `/construction/combine`
    pub signed_transaction: String,
}

/// Response with the hash of a transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/models/TransactionIdentifierResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransactionIdentifierResponse {
    /// The hash of the transaction so it can be looked up on the chain
    pub transaction_identifier: TransactionIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Request for anything that doesn't need a network identifier
///
/// [API Spec](https://www.rosetta-api.org/docs/models/MetadataRequest.html)
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetadataRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Request for network information
///
/// [API Spec](https://www.rosetta-api.org/docs/models/NetworkRequest.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkRequest {
    pub network_identifier: NetworkIdentifier,
}

/// [API Spec](https://www.rosetta-api.org/docs/models/NetworkListResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkListResponse {
    pub network_identifiers: Vec<NetworkIdentifier>,
}

/// [API Spec](https://www.rosetta-api.org/docs/models/NetworkOptionsResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkOptionsResponse {
    pub version: Version,
    pub allow: Allow,
}

/// [API Spec](https://www.rosetta-api.org/docs/models/NetworkStatusResponse.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkStatusResponse {
    pub current_block_identifier: BlockIdentifier,
    /// Timestamp of the current block in milliseconds
    pub current_block_timestamp: u64,
    pub genesis_block_identifier: BlockIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_block_identifier: Option<BlockIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    pub peers: Vec<Peer>,
}
