// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Fantom Rosetta API
//!
//! [Rosetta API Spec](https://www.rosetta-api.org/docs/Reference.html)

use crate::{
    config::Configuration,
    error::{ApiError, ApiResult},
    node::NodeGateway,
    types::{Catalog, Error},
};
use std::{convert::Infallible, fmt::Formatter, future::Future, net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use warp::{
    http::{HeaderValue, Method, StatusCode},
    reject::{MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    reply, Filter, Rejection, Reply,
};

mod construction;
mod network;

pub mod client;
pub mod codec;
pub mod common;
pub mod config;
pub mod crypto;
pub mod error;
pub mod node;
pub mod opera;
pub mod types;

#[cfg(test)]
mod tests;

pub const BLOCKCHAIN: &str = "Fantom";
pub const CURRENCY: &str = "FTM";
pub const NUM_DECIMALS: u8 = 18;
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;
pub const MIDDLEWARE_VERSION: &str = "0.0.4";
pub const NODE_VERSION: &str = "1.1.0-rc.4";
pub const ROSETTA_VERSION: &str = "1.4.12";

/// Rosetta API context for use on all APIs
#[derive(Clone)]
pub struct RosettaContext {
    /// Static configuration of the server
    pub config: Arc<Configuration>,
    /// Supported operation types, statuses and call methods
    pub catalog: Arc<Catalog>,
    /// Access to the Opera node.  Not available in offline mode
    node: Option<Arc<dyn NodeGateway>>,
}

impl std::fmt::Debug for RosettaContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosettaContext")
            .field("config", &self.config)
            .field("online", &self.node.is_some())
            .finish()
    }
}

impl RosettaContext {
    pub fn new(config: Configuration, node: Option<Arc<dyn NodeGateway>>) -> Self {
        RosettaContext {
            config: Arc::new(config),
            catalog: Arc::new(Catalog::new()),
            node,
        }
    }

    /// Retrieves the node gateway, failing if the server runs offline
    pub fn node(&self) -> ApiResult<&Arc<dyn NodeGateway>> {
        self.node.as_ref().ok_or(ApiError::UnavailableOffline(None))
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }
}

/// Starts the HTTP server (warp-based) for Rosetta on the current runtime
///
/// The server stops accepting connections once `shutdown` resolves.  Returns the bound
/// address (useful when binding to port 0) and the handle of the serving task.
pub fn bootstrap(
    address: SocketAddr,
    context: RosettaContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    debug!("Starting up Rosetta server with {:?}", context);
    let (bound, server) =
        warp::serve(routes(context)).try_bind_with_graceful_shutdown(address, shutdown)?;
    info!("Rosetta server listening on {}", bound);
    Ok((bound, tokio::spawn(server)))
}

/// Collection of all routes for the server
pub fn routes(
    context: RosettaContext,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    construction::combine_route(context.clone())
        .or(construction::derive_route(context.clone()))
        .or(construction::hash_route(context.clone()))
        .or(construction::metadata_route(context.clone()))
        .or(construction::parse_route(context.clone()))
        .or(construction::payloads_route(context.clone()))
        .or(construction::preprocess_route(context.clone()))
        .or(construction::submit_route(context.clone()))
        .or(network::list_route(context.clone()))
        .or(network::options_route(context.clone()))
        .or(network::status_route(context))
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec![Method::GET, Method::POST])
                .allow_headers(vec![warp::http::header::CONTENT_TYPE]),
        )
        .recover(handle_rejection)
}

/// Handle error codes from warp
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let body;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        body = reply::json(&Error::new(code, "Not Found".to_owned()));
    } else if let Some(cause) = err.find::<warp::cors::CorsForbidden>() {
        code = StatusCode::FORBIDDEN;
        body = reply::json(&Error::new(code, cause.to_string()));
    } else if let Some(cause) = err.find::<warp::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        body = reply::json(
            &ApiError::DeserializationFailed(Some(cause.to_string())).into_error(),
        );
    } else if let Some(cause) = err.find::<warp::reject::LengthRequired>() {
        code = StatusCode::LENGTH_REQUIRED;
        body = reply::json(&Error::new(code, cause.to_string()));
    } else if let Some(cause) = err.find::<PayloadTooLarge>() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        body = reply::json(&Error::new(code, cause.to_string()));
    } else if let Some(cause) = err.find::<UnsupportedMediaType>() {
        code = StatusCode::UNSUPPORTED_MEDIA_TYPE;
        body = reply::json(&Error::new(code, cause.to_string()));
    } else if let Some(cause) = err.find::<MethodNotAllowed>() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        body = reply::json(&Error::new(code, cause.to_string()));
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        body = reply::json(&Error::new(code, format!("unexpected error: {:?}", err)));
    }
    let mut rep = reply::with_status(body, code).into_response();
    rep.headers_mut()
        .insert("access-control-allow-origin", HeaderValue::from_static("*"));
    Ok(rep)
}
