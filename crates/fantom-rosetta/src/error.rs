// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::types::{self, ErrorDetails};
use hex::FromHexError;
use serde::Serialize;
use thiserror::Error;
use warp::{http::StatusCode, reply::Reply};

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to clients of the Rosetta API
///
/// Every variant maps to a stable Rosetta error code, see [`ApiError::code`]
#[derive(Debug, Serialize, Error)]
pub enum ApiError {
    #[error("Endpoint is not available offline")]
    UnavailableOffline(Option<String>),
    #[error("Opera node error")]
    NodeError(Option<String>),
    #[error("Unsupported curve type")]
    UnsupportedCurveType(Option<String>),
    #[error("Deserialization failed")]
    DeserializationFailed(Option<String>),
    #[error("Invalid signature")]
    InvalidSignature(Option<String>),
    #[error("Invalid address")]
    InvalidAddress(Option<String>),
    #[error("Network identifier doesn't match")]
    NetworkIdentifierMismatch,
    #[error("Invalid transfer operations")]
    InvalidTransferOperations(Option<&'static str>),
    #[error("Unsupported signature count")]
    UnsupportedSignatureCount(Option<usize>),
    #[error("Chain Id doesn't match")]
    ChainIdMismatch,
    #[error("Invalid input")]
    InvalidInput(Option<String>),
    #[error("Payload metadata is missing")]
    MissingPayloadMetadata,
    #[error("Unsupported signature type")]
    UnsupportedSignatureType(Option<String>),
    #[error("Internal error")]
    InternalError(Option<String>),
}

impl ApiError {
    pub fn all() -> Vec<ApiError> {
        use ApiError::*;
        vec![
            UnavailableOffline(None),
            NodeError(None),
            UnsupportedCurveType(None),
            DeserializationFailed(None),
            InvalidSignature(None),
            InvalidAddress(None),
            NetworkIdentifierMismatch,
            InvalidTransferOperations(None),
            UnsupportedSignatureCount(None),
            ChainIdMismatch,
            InvalidInput(None),
            MissingPayloadMetadata,
            UnsupportedSignatureType(None),
            InternalError(None),
        ]
    }

    pub fn code(&self) -> u32 {
        use ApiError::*;
        match self {
            UnavailableOffline(_) => 1,
            NodeError(_) => 2,
            UnsupportedCurveType(_) => 3,
            DeserializationFailed(_) => 4,
            InvalidSignature(_) => 5,
            InvalidAddress(_) => 6,
            NetworkIdentifierMismatch => 7,
            InvalidTransferOperations(_) => 8,
            UnsupportedSignatureCount(_) => 9,
            ChainIdMismatch => 10,
            InvalidInput(_) => 11,
            MissingPayloadMetadata => 12,
            UnsupportedSignatureType(_) => 13,
            InternalError(_) => 14,
        }
    }

    /// Node failures are transient from the client's point of view, nothing else is
    pub fn retriable(&self) -> bool {
        matches!(self, ApiError::NodeError(_))
    }

    pub fn status_code(&self) -> StatusCode {
        use ApiError::*;
        match self {
            UnavailableOffline(_) => StatusCode::SERVICE_UNAVAILABLE,
            NodeError(_) | InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub(crate) fn details(self) -> Option<ErrorDetails> {
        use ApiError::*;
        match self {
            UnavailableOffline(inner)
            | NodeError(inner)
            | UnsupportedCurveType(inner)
            | DeserializationFailed(inner)
            | InvalidSignature(inner)
            | InvalidAddress(inner)
            | InvalidInput(inner)
            | UnsupportedSignatureType(inner)
            | InternalError(inner) => inner,
            InvalidTransferOperations(inner) => inner.map(str::to_string),
            UnsupportedSignatureCount(inner) => {
                inner.map(|count| format!("Expected exactly 1 signature, got {}", count))
            },
            NetworkIdentifierMismatch | ChainIdMismatch | MissingPayloadMetadata => None,
        }
        .map(|details| ErrorDetails { details })
    }

    pub fn into_error(self) -> types::Error {
        self.into()
    }
}

impl From<ApiError> for types::Error {
    fn from(error: ApiError) -> Self {
        let message = error.message();
        let code = error.code();
        let retriable = error.retriable();
        let details = error.details();
        types::Error {
            message,
            code,
            retriable,
            details,
        }
    }
}

impl From<FromHexError> for ApiError {
    fn from(err: FromHexError) -> Self {
        ApiError::DeserializationFailed(Some(err.to_string()))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::DeserializationFailed(Some(err.to_string()))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(Some(err.to_string()))
    }
}

impl warp::reject::Reject for ApiError {}

impl Reply for ApiError {
    fn into_response(self) -> warp::reply::Response {
        let status = self.status_code();
        warp::reply::with_status(warp::reply::json(&self.into_error()), status).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_error_codes_are_unique() {
        let errors = ApiError::all();
        let codes: HashSet<_> = errors.iter().map(ApiError::code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_conversion_keeps_node_cause() {
        let error = ApiError::NodeError(Some("nonce too low".to_string())).into_error();
        assert_eq!(error.code, 2);
        assert!(error.retriable);
        assert_eq!(error.message, "Opera node error");
        assert_eq!(error.details.unwrap().details, "nonce too low");
    }

    #[test]
    fn test_signature_count_details() {
        let error = ApiError::UnsupportedSignatureCount(Some(2)).into_error();
        assert!(!error.retriable);
        assert_eq!(
            error.details.unwrap().details,
            "Expected exactly 1 signature, got 2"
        );
    }
}
