// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Network APIs
//!
//! These describe the network the server is configured for, what it supports, and how far
//! along the node is.
//!
//! [API Spec](https://www.rosetta-api.org/docs/NetworkApi.html)

use crate::{
    common::{check_network, handle_request, with_context},
    error::{ApiError, ApiResult},
    types::*,
    RosettaContext, MIDDLEWARE_VERSION, NODE_VERSION, ROSETTA_VERSION,
};
use tracing::{debug, trace};
use warp::Filter;

pub fn list_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("network" / "list")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(network_list))
}

pub fn options_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("network" / "options")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(network_options))
}

pub fn status_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("network" / "status")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(network_status))
}

/// List the networks available for this server (OFFLINE)
///
/// [API Spec](https://www.rosetta-api.org/docs/NetworkApi.html#networklist)
async fn network_list(
    _empty: MetadataRequest,
    server_context: RosettaContext,
) -> ApiResult<NetworkListResponse> {
    debug!("/network/list");
    Ok(NetworkListResponse {
        network_identifiers: vec![server_context.config.network.clone()],
    })
}

/// Versions and everything the server can return (OFFLINE)
///
/// [API Spec](https://www.rosetta-api.org/docs/NetworkApi.html#networkoptions)
async fn network_options(
    request: NetworkRequest,
    server_context: RosettaContext,
) -> ApiResult<NetworkOptionsResponse> {
    debug!("/network/options");
    trace!("/network/options {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let version = Version {
        rosetta_version: ROSETTA_VERSION.to_string(),
        node_version: NODE_VERSION.to_string(),
        middleware_version: MIDDLEWARE_VERSION.to_string(),
    };
    let errors = ApiError::all()
        .into_iter()
        .map(|err| err.into_error())
        .collect();

    Ok(NetworkOptionsResponse {
        version,
        allow: Allow::new(&server_context.catalog, errors),
    })
}

/// Current block, sync status and peers of the node (ONLINE)
///
/// Peers come from the `admin` API, which is skipped when so configured.
///
/// [API Spec](https://www.rosetta-api.org/docs/NetworkApi.html#networkstatus)
async fn network_status(
    request: NetworkRequest,
    server_context: RosettaContext,
) -> ApiResult<NetworkStatusResponse> {
    debug!("/network/status");
    trace!("/network/status {:?}", request);
    check_network(request.network_identifier, &server_context)?;
    let node = server_context.node()?;

    let (header, sync_status) = node.latest_status().await?;
    let peers = if server_context.config.skip_admin {
        vec![]
    } else {
        node.peers().await?
    };

    Ok(NetworkStatusResponse {
        current_block_identifier: BlockIdentifier::from(&header),
        current_block_timestamp: header.timestamp_millis(),
        genesis_block_identifier: server_context.config.genesis_block_identifier.clone(),
        oldest_block_identifier: None,
        sync_status: Some(sync_status),
        peers,
    })
}
