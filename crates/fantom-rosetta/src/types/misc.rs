// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{Display, Formatter},
    str::FromStr,
};
use warp::http::StatusCode;

/// Errors that can be returned by the API
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Error.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Error {
    /// Error code
    pub code: u32,
    /// Message that always matches the error code
    pub message: String,
    /// Whether a call can retry on the error
    pub retriable: bool,
    /// Specific details of the error e.g. stack trace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl Error {
    /// Error for failures that happen before a request reaches a handler
    pub fn new(status: StatusCode, message: String) -> Self {
        Error {
            code: status.as_u16() as u32,
            message,
            retriable: false,
            details: None,
        }
    }
}

/// Error details that are specific to the instance
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorDetails {
    /// Related error details
    pub details: String,
}

/// Status of an operation
///
/// [API Spec](https://www.rosetta-api.org/docs/models/OperationStatus.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OperationStatus {
    pub status: String,
    pub successful: bool,
}

/// Represents a Peer, used for discovery
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Peer.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Peer {
    pub peer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// [API Spec](https://www.rosetta-api.org/docs/models/SyncStatus.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SyncStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub synced: bool,
}

/// Version information for the current deployment to handle software version matching
///
/// [API Spec](https://www.rosetta-api.org/docs/models/Version.html)
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Version {
    /// Rosetta version, this should be hardcoded
    pub rosetta_version: String,
    /// Node version, the Opera release this middleware is built against
    pub node_version: String,
    /// Middleware version, this should be the version of this software
    pub middleware_version: String,
}

/// An internal enum to support Operation typing
///
/// These are the EVM call frame kinds plus the synthetic fee operation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum OperationType {
    Fee,
    Call,
    Create,
    Create2,
    SelfDestruct,
    CallCode,
    DelegateCall,
    StaticCall,
    Destruct,
}

impl OperationType {
    const CALL: &'static str = "CALL";
    const CALLCODE: &'static str = "CALLCODE";
    const CREATE: &'static str = "CREATE";
    const CREATE2: &'static str = "CREATE2";
    const DELEGATECALL: &'static str = "DELEGATECALL";
    const DESTRUCT: &'static str = "DESTRUCT";
    const FEE: &'static str = "FEE";
    const SELFDESTRUCT: &'static str = "SELFDESTRUCT";
    const STATICCALL: &'static str = "STATICCALL";

    pub fn all() -> Vec<OperationType> {
        use OperationType::*;
        vec![
            Fee,
            Call,
            Create,
            Create2,
            SelfDestruct,
            CallCode,
            DelegateCall,
            StaticCall,
            Destruct,
        ]
    }

    /// Operations that move value along a call frame
    pub fn is_call_type(&self) -> bool {
        use OperationType::*;
        matches!(self, Call | CallCode | DelegateCall | StaticCall)
    }

    /// Operations that deploy a contract
    pub fn is_create_type(&self) -> bool {
        matches!(self, OperationType::Create | OperationType::Create2)
    }
}

impl FromStr for OperationType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::FEE => Ok(OperationType::Fee),
            Self::CALL => Ok(OperationType::Call),
            Self::CREATE => Ok(OperationType::Create),
            Self::CREATE2 => Ok(OperationType::Create2),
            Self::SELFDESTRUCT => Ok(OperationType::SelfDestruct),
            Self::CALLCODE => Ok(OperationType::CallCode),
            Self::DELEGATECALL => Ok(OperationType::DelegateCall),
            Self::STATICCALL => Ok(OperationType::StaticCall),
            Self::DESTRUCT => Ok(OperationType::Destruct),
            _ => Err(ApiError::DeserializationFailed(Some(format!(
                "Invalid OperationType: {}",
                s
            )))),
        }
    }
}

impl Display for OperationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use OperationType::*;
        f.write_str(match self {
            Fee => Self::FEE,
            Call => Self::CALL,
            Create => Self::CREATE,
            Create2 => Self::CREATE2,
            SelfDestruct => Self::SELFDESTRUCT,
            CallCode => Self::CALLCODE,
            DelegateCall => Self::DELEGATECALL,
            StaticCall => Self::STATICCALL,
            Destruct => Self::DESTRUCT,
        })
    }
}

/// An internal type to support typing of Operation statuses
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OperationStatusType {
    /// Operation was part of a successfully committed transaction
    Success,
    /// Operation was not part of a successfully committed transaction
    Failure,
}

impl OperationStatusType {
    const FAILURE: &'static str = "FAILURE";
    const SUCCESS: &'static str = "SUCCESS";

    pub fn all() -> Vec<OperationStatusType> {
        vec![OperationStatusType::Success, OperationStatusType::Failure]
    }
}

impl From<OperationStatusType> for OperationStatus {
    fn from(status: OperationStatusType) -> Self {
        let successful = match status {
            OperationStatusType::Success => true,
            OperationStatusType::Failure => false,
        };

        OperationStatus {
            status: status.to_string(),
            successful,
        }
    }
}

impl TryFrom<OperationStatus> for OperationStatusType {
    type Error = ApiError;

    fn try_from(status: OperationStatus) -> Result<Self, Self::Error> {
        OperationStatusType::from_str(&status.status)
    }
}

impl FromStr for OperationStatusType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::SUCCESS => Ok(OperationStatusType::Success),
            Self::FAILURE => Ok(OperationStatusType::Failure),
            _ => Err(ApiError::DeserializationFailed(Some(format!(
                "Invalid OperationStatusType: {}",
                s
            )))),
        }
    }
}

impl Display for OperationStatusType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OperationStatusType::Success => Self::SUCCESS,
            OperationStatusType::Failure => Self::FAILURE,
        })
    }
}

/// JSON-RPC methods advertised as call methods in `/network/options`
pub const CALL_METHODS: [&str; 4] = [
    "eth_getBlockByNumber",
    "eth_getTransactionReceipt",
    "eth_call",
    "eth_estimateGas",
];

/// Immutable catalog of everything the server advertises
///
/// Built once at startup and shared through the server context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Catalog {
    pub operation_types: Vec<OperationType>,
    pub operation_statuses: Vec<OperationStatusType>,
    pub call_methods: Vec<String>,
    pub historical_balance_lookup: bool,
    pub mempool_coins: bool,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            operation_types: OperationType::all(),
            operation_statuses: OperationStatusType::all(),
            call_methods: CALL_METHODS.iter().map(|method| method.to_string()).collect(),
            historical_balance_lookup: true,
            mempool_coins: false,
        }
    }

    /// Looks up an operation type by its exact name, only types in the catalog match
    pub fn operation_type(&self, operation_type: &str) -> Option<OperationType> {
        OperationType::from_str(operation_type)
            .ok()
            .filter(|parsed| self.operation_types.contains(parsed))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_names() {
        for operation_type in OperationType::all() {
            let name = operation_type.to_string();
            assert_eq!(name, name.to_uppercase());
            assert_eq!(OperationType::from_str(&name).unwrap(), operation_type);
        }
        assert!(OperationType::from_str("call").is_err());
        assert!(OperationType::from_str(" CALL ").is_err());
        assert!(OperationType::from_str("TRANSFER").is_err());
    }

    #[test]
    fn test_catalog_operation_type() {
        let catalog = Catalog::new();
        assert_eq!(catalog.operation_type("CALL"), Some(OperationType::Call));
        assert_eq!(catalog.operation_type("Call"), None);
        assert_eq!(catalog.operation_type("TRANSFER"), None);

        let calls_only = Catalog {
            operation_types: vec![OperationType::Call],
            ..Catalog::new()
        };
        assert_eq!(calls_only.operation_type("FEE"), None);
    }

    #[test]
    fn test_call_and_create_types() {
        assert!(OperationType::Call.is_call_type());
        assert!(OperationType::StaticCall.is_call_type());
        assert!(!OperationType::Fee.is_call_type());
        assert!(OperationType::Create2.is_create_type());
        assert!(!OperationType::SelfDestruct.is_create_type());
    }

    #[test]
    fn test_status_conversion() {
        let status: OperationStatus = OperationStatusType::Success.into();
        assert_eq!(status.status, "SUCCESS");
        assert!(status.successful);
        let status: OperationStatus = OperationStatusType::Failure.into();
        assert!(!status.successful);
        assert_eq!(
            OperationStatusType::try_from(status).unwrap(),
            OperationStatusType::Failure
        );
    }
}
