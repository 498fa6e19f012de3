// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{ApiError, ApiResult},
    types::{Currency, NetworkIdentifier},
    RosettaContext, BLOCKCHAIN, CURRENCY, NUM_DECIMALS,
};
use ethers::types::Address;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::Filter;

/// Checks the request network matches the server network
pub fn check_network(
    network_identifier: NetworkIdentifier,
    server_context: &RosettaContext,
) -> ApiResult<()> {
    if network_identifier.blockchain == BLOCKCHAIN
        && network_identifier.network == server_context.config.network.network
    {
        Ok(())
    } else {
        Err(ApiError::NetworkIdentifierMismatch)
    }
}

/// Attaches the server context to a route
pub fn with_context(
    context: RosettaContext,
) -> impl Filter<Extract = (RosettaContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

/// Adapts an `async fn(request, context) -> ApiResult<response>` handler to warp
///
/// Errors are rendered as Rosetta [`crate::types::Error`] bodies with the status code of the
/// [`ApiError`], so a handler never produces a rejection.
pub fn handle_request<'a, F, R, Req, Resp>(
    handler: F,
) -> impl Fn(Req, RosettaContext) -> BoxFuture<'static, Result<Box<dyn warp::Reply>, Infallible>>
       + Clone
where
    F: FnOnce(Req, RosettaContext) -> R + Clone + Copy + Send + 'static,
    R: futures::Future<Output = Result<Resp, ApiError>> + Send,
    Req: Deserialize<'a> + Send + 'static,
    Resp: Serialize,
{
    move |request, options| {
        let fut = async move {
            match handler(request, options).await {
                Ok(response) => Ok(Box::new(warp::reply::json(&response)) as Box<dyn warp::Reply>),
                Err(api_error) => {
                    let status = api_error.status_code();
                    Ok(Box::new(warp::reply::with_status(
                        warp::reply::json(&api_error.into_error()),
                        status,
                    )) as Box<dyn warp::Reply>)
                },
            }
        };
        Box::pin(fut)
    }
}

/// The only currency that can be transferred, FTM
pub fn native_coin() -> Currency {
    Currency {
        symbol: CURRENCY.to_string(),
        decimals: NUM_DECIMALS,
        metadata: None,
    }
}

pub fn is_native_coin(currency: &Currency) -> ApiResult<()> {
    if currency == &native_coin() {
        Ok(())
    } else {
        Err(ApiError::InvalidTransferOperations(Some(
            "Currency must be FTM",
        )))
    }
}

pub fn strip_hex_prefix(str: &str) -> &str {
    str.strip_prefix("0x")
        .or_else(|| str.strip_prefix("0X"))
        .unwrap_or(str)
}

/// Decodes hex with or without a leading `0x`
pub fn decode_hex(str: &str) -> ApiResult<Vec<u8>> {
    Ok(hex::decode(strip_hex_prefix(str))?)
}

/// Parses a 20 byte hex address, checksum casing is not enforced
pub fn parse_address(str: &str) -> ApiResult<Address> {
    let hex_str = strip_hex_prefix(str);
    if hex_str.len() != 40 {
        return Err(ApiError::InvalidAddress(Some(format!(
            "{} is not a 20 byte address",
            str
        ))));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|err| ApiError::InvalidAddress(Some(format!("{}: {}", str, err))))?;
    Ok(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_matches, assert_ok_eq};

    #[test]
    fn test_strip_hex_prefix() {
        assert_eq!(strip_hex_prefix("0xabcd"), "abcd");
        assert_eq!(strip_hex_prefix("0Xabcd"), "abcd");
        assert_eq!(strip_hex_prefix("abcd"), "abcd");
    }

    #[test]
    fn test_decode_hex() {
        assert_ok_eq!(decode_hex("0x0a0B"), vec![10u8, 11]);
        assert_ok_eq!(decode_hex(""), Vec::<u8>::new());
        assert_matches!(decode_hex("0xabc"), Err(ApiError::DeserializationFailed(_)));
        assert_err!(decode_hex("zz"));
    }

    #[test]
    fn test_parse_address() {
        assert_ok_eq!(
            parse_address("0x57B414a0332B5CaB885a451c2a28a07d1e9b8a8d"),
            parse_address("57b414a0332b5cab885a451c2a28a07d1e9b8a8d").unwrap()
        );
        assert_matches!(parse_address("0x57B4"), Err(ApiError::InvalidAddress(_)));
        assert_matches!(
            parse_address("0xZZB414a0332B5CaB885a451c2a28a07d1e9b8a8d"),
            Err(ApiError::InvalidAddress(_))
        );
    }

    #[test]
    fn test_native_coin() {
        assert!(is_native_coin(&native_coin()).is_ok());
        let mut other = native_coin();
        other.decimals = 6;
        assert_matches!(
            is_native_coin(&other),
            Err(ApiError::InvalidTransferOperations(_))
        );
    }
}
