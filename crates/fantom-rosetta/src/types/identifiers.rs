// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::parse_address,
    crypto::to_checksum,
    error::ApiResult,
    node::BlockHeader,
    BLOCKCHAIN,
};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Account identifier, specified as a hex encoded account address (with leading 0x)
///
/// [API Spec](https://www.rosetta-api.org/docs/models/AccountIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccountIdentifier {
    /// Hex encoded address beginning with 0x, checksum cased
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_account: Option<SubAccountIdentifier>,
}

impl AccountIdentifier {
    /// Parse the [`AccountIdentifier`] into an [`Address`]
    pub fn account_address(&self) -> ApiResult<Address> {
        Address::try_from(self)
    }
}

impl TryFrom<&AccountIdentifier> for Address {
    type Error = crate::error::ApiError;

    fn try_from(account: &AccountIdentifier) -> Result<Self, Self::Error> {
        parse_address(&account.address)
    }
}

impl From<Address> for AccountIdentifier {
    fn from(address: Address) -> Self {
        AccountIdentifier {
            address: to_checksum(&address),
            sub_account: None,
        }
    }
}

/// Identifier for a block, by height and hash
///
/// [API Spec](https://www.rosetta-api.org/docs/models/BlockIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockIdentifier {
    /// Block number, starting at 0 for genesis
    pub index: u64,
    /// Block hash
    pub hash: String,
}

impl From<&BlockHeader> for BlockIdentifier {
    fn from(header: &BlockHeader) -> Self {
        BlockIdentifier {
            index: header.number(),
            hash: format!("{:?}", header.hash),
        }
    }
}

/// Identifier for this specific network deployment
///
/// [API Spec](https://www.rosetta-api.org/docs/models/NetworkIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkIdentifier {
    /// Blockchain name, always `Fantom`
    pub blockchain: String,
    /// Network name e.g. `Mainnet` or `Testnet`
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_network_identifier: Option<SubNetworkIdentifier>,
}

impl NetworkIdentifier {
    pub fn new(network: &str) -> Self {
        NetworkIdentifier {
            blockchain: BLOCKCHAIN.to_string(),
            network: network.to_string(),
            sub_network_identifier: None,
        }
    }
}

/// Identifies a specific [`crate::types::Operation`] within a transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/models/OperationIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OperationIdentifier {
    /// The unique index of the operation within a transaction
    ///
    /// It must be 0 to n within the transaction.
    pub index: u64,
    /// Only necessary if operation order is required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_index: Option<u64>,
}

impl From<u64> for OperationIdentifier {
    fn from(index: u64) -> Self {
        OperationIdentifier {
            index,
            network_index: None,
        }
    }
}

/// Sub account identifier if there are sub accounts
///
/// [API Spec](https://www.rosetta-api.org/docs/models/SubAccountIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubAccountIdentifier {
    pub address: String,
}

/// Sub network identifier if there are sub networks
///
/// [API Spec](https://www.rosetta-api.org/docs/models/SubNetworkIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubNetworkIdentifier {
    pub network: String,
}

/// TransactionIdentifier to represent a transaction by hash
///
/// [API Spec](https://www.rosetta-api.org/docs/models/TransactionIdentifier.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransactionIdentifier {
    pub hash: String,
}
