// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Access to the Opera node
//!
//! [`JsonRpc`] is the raw capability (single call, batched call, close) and [`NodeGateway`]
//! the typed view the API handlers depend on.  [`OperaClient`] implements the latter on top of
//! any implementation of the former, [`HttpJsonRpc`] being the one used in production.

use crate::{
    error::{ApiError, ApiResult},
    types::{Peer, SyncStatus},
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{debug, trace, warn};
use url::Url;

const JSONRPC_VERSION: &str = "2.0";

/// Raw JSON-RPC access to a node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JsonRpc: Send + Sync {
    /// Calls a single method, returning its `result`
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value>;

    /// Calls several methods in one round trip
    ///
    /// The outer error is for transport failures, the inner ones are per call and are in the
    /// same order as `calls`.
    async fn batch_call(&self, calls: Vec<(String, Value)>) -> ApiResult<Vec<ApiResult<Value>>>;

    /// Releases the connection, further calls are not expected
    async fn close(&self);
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl Response {
    fn into_result(self) -> ApiResult<Value> {
        match self.error {
            Some(error) => Err(ApiError::NodeError(Some(format!(
                "{} (code {})",
                error.message, error.code
            )))),
            None => Ok(self.result),
        }
    }
}

fn node_error(err: impl std::fmt::Display) -> ApiError {
    ApiError::NodeError(Some(err.to_string()))
}

/// JSON-RPC over HTTP, safe to share between concurrent requests
#[derive(Debug)]
pub struct HttpJsonRpc {
    url: Url,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpJsonRpc {
    /// Every call is bounded by `timeout`
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpJsonRpc {
            url,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post<T: Serialize + ?Sized, R: DeserializeOwned>(&self, body: &T) -> ApiResult<R> {
        let response = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(node_error)?;
        if !response.status().is_success() {
            return Err(ApiError::NodeError(Some(format!(
                "Node responded with {}",
                response.status()
            ))));
        }
        response.json().await.map_err(node_error)
    }
}

#[async_trait]
impl JsonRpc for HttpJsonRpc {
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        let request = Request {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id(),
            method,
            params: &params,
        };
        trace!("JSON-RPC call {:?}", request);
        let response: Response = self.post(&request).await?;
        response.into_result()
    }

    async fn batch_call(&self, calls: Vec<(String, Value)>) -> ApiResult<Vec<ApiResult<Value>>> {
        let requests: Vec<_> = calls
            .iter()
            .map(|(method, params)| Request {
                jsonrpc: JSONRPC_VERSION,
                id: self.next_id(),
                method,
                params,
            })
            .collect();
        trace!("JSON-RPC batch {:?}", requests);
        let responses: Vec<Response> = self.post(&requests).await?;

        // Responses to a batch may come back in any order
        let mut by_id: HashMap<u64, Response> = responses
            .into_iter()
            .map(|response| (response.id, response))
            .collect();
        Ok(requests
            .iter()
            .map(|request| match by_id.remove(&request.id) {
                Some(response) => response.into_result(),
                None => Err(ApiError::NodeError(Some(format!(
                    "No response to {}",
                    request.method
                )))),
            })
            .collect())
    }

    /// reqwest pools its connections inside the client and frees them on drop, so there is
    /// nothing to release here beyond marking the end of use
    async fn close(&self) {
        debug!("Closing JSON-RPC client for {}", self.url);
    }
}

/// Block header fields the API uses
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub parent_hash: H256,
    pub number: U64,
    /// Seconds since the UNIX epoch
    pub timestamp: U64,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub miner: Address,
    #[serde(default)]
    pub base_fee_per_gas: Option<U256>,
}

#[derive(Deserialize)]
struct HeaderHash {
    hash: H256,
}

/// A block header together with the hash the node computed for it
///
/// The hash isn't one of the header fields, so the document is decoded twice: once as a
/// [`Header`], once for `hash` alone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub header: Header,
    pub hash: H256,
}

impl BlockHeader {
    pub fn from_json(value: Value) -> ApiResult<Self> {
        let HeaderHash { hash } = serde_json::from_value(value.clone())?;
        let header = serde_json::from_value(value)?;
        Ok(BlockHeader { header, hash })
    }

    pub fn number(&self) -> u64 {
        self.header.number.as_u64()
    }

    pub fn timestamp_millis(&self) -> u64 {
        self.header.timestamp.as_u64().saturating_mul(1000)
    }
}

/// Progress reported by `eth_syncing` while the node catches up
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncProgress {
    current_block: U64,
    highest_block: U64,
}

/// Typed node operations used by the API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeGateway: Send + Sync {
    /// Gas price the node suggests for a new transaction
    async fn suggest_gas_price(&self) -> ApiResult<U256>;

    /// Next nonce of `address`, counting transactions in the pool
    async fn pending_nonce_at(&self, address: Address) -> ApiResult<U64>;

    /// Broadcasts a raw signed transaction, returning the hash the node reports
    async fn send_raw_transaction(&self, raw: Bytes) -> ApiResult<H256>;

    /// Latest block header and sync status, fetched together
    async fn latest_status(&self) -> ApiResult<(BlockHeader, SyncStatus)>;

    /// Peers of the node, needs the admin API
    async fn peers(&self) -> ApiResult<Vec<Peer>>;
}

/// [`NodeGateway`] on top of a [`JsonRpc`] connection to Opera
#[derive(Debug)]
pub struct OperaClient<R> {
    rpc: R,
}

impl<R: JsonRpc> OperaClient<R> {
    pub fn new(rpc: R) -> Self {
        OperaClient { rpc }
    }

    pub async fn close(&self) {
        self.rpc.close().await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ApiResult<T> {
        let value = self.rpc.call(method, params).await?;
        decode(method, value)
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> ApiResult<T> {
    serde_json::from_value(value)
        .map_err(|err| ApiError::NodeError(Some(format!("Invalid {} response: {}", method, err))))
}

#[async_trait]
impl<R: JsonRpc> NodeGateway for OperaClient<R> {
    async fn suggest_gas_price(&self) -> ApiResult<U256> {
        self.call("eth_gasPrice", json!([])).await
    }

    async fn pending_nonce_at(&self, address: Address) -> ApiResult<U64> {
        self.call("eth_getTransactionCount", json!([address, "pending"]))
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ApiResult<H256> {
        self.call("eth_sendRawTransaction", json!([raw])).await
    }

    async fn latest_status(&self) -> ApiResult<(BlockHeader, SyncStatus)> {
        let mut results = self
            .rpc
            .batch_call(vec![
                ("eth_getBlockByNumber".to_string(), json!(["latest", false])),
                ("eth_syncing".to_string(), json!([])),
            ])
            .await?
            .into_iter();
        let (block, syncing) = match (results.next(), results.next()) {
            (Some(block), Some(syncing)) => (block?, syncing?),
            _ => {
                return Err(ApiError::NodeError(Some(
                    "Incomplete batch response".to_string(),
                )))
            },
        };

        if block.is_null() {
            return Err(ApiError::NodeError(Some(
                "Latest block not found".to_string(),
            )));
        }
        let header = BlockHeader::from_json(block).map_err(|err| {
            ApiError::NodeError(err.details().map(|details| details.details))
        })?;

        // `eth_syncing` is `false` once the node caught up
        let sync_status = if syncing == Value::Bool(false) {
            SyncStatus {
                current_index: Some(header.number()),
                target_index: None,
                stage: None,
                synced: true,
            }
        } else {
            let progress: SyncProgress = decode("eth_syncing", syncing)?;
            SyncStatus {
                current_index: Some(progress.current_block.as_u64()),
                target_index: Some(progress.highest_block.as_u64()),
                stage: None,
                synced: progress.current_block >= progress.highest_block,
            }
        };
        Ok((header, sync_status))
    }

    async fn peers(&self) -> ApiResult<Vec<Peer>> {
        let peers: Vec<Value> = self.call("admin_peers", json!([])).await?;
        Ok(peers
            .into_iter()
            .filter_map(|mut peer| {
                let peer_id = match peer.get("id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => {
                        warn!("Skipping peer without an id: {}", peer);
                        return None;
                    },
                };
                let metadata = peer.as_object_mut().map(|fields| {
                    fields.remove("id");
                    Value::Object(fields.clone())
                });
                Some(Peer { peer_id, metadata })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_matches, assert_ok};
    use std::net::SocketAddr;
    use warp::Filter;

    fn latest_block() -> Value {
        json!({
            "parentHash": "0x00000000000003e80000000000000000000000000000000000000000000000aa",
            "number": "0x10",
            "timestamp": "0x61b8f0a0",
            "gasLimit": "0xffffffffffff",
            "gasUsed": "0x5208",
            "miner": "0x0000000000000000000000000000000000000000",
            "hash": "0x00000000000003e80000000000000000000000000000000000000000000000bb",
            "transactions": [],
        })
    }

    #[test]
    fn test_block_header_merged_decode() {
        let header = BlockHeader::from_json(latest_block()).unwrap();
        assert_eq!(header.number(), 16);
        assert_eq!(header.timestamp_millis(), 0x61b8f0a0 * 1000);
        assert_eq!(
            format!("{:?}", header.hash),
            "0x00000000000003e80000000000000000000000000000000000000000000000bb"
        );

        let mut without_hash = latest_block();
        without_hash.as_object_mut().unwrap().remove("hash");
        assert_matches!(
            BlockHeader::from_json(without_hash),
            Err(ApiError::DeserializationFailed(_))
        );
    }

    #[tokio::test]
    async fn test_suggest_gas_price() {
        let mut rpc = MockJsonRpc::new();
        rpc.expect_call()
            .withf(|method, params| method == "eth_gasPrice" && params == &json!([]))
            .times(1)
            .returning(|_, _| Ok(json!("0x3b9aca00")));
        let client = OperaClient::new(rpc);
        assert_eq!(
            client.suggest_gas_price().await.unwrap(),
            U256::from(1_000_000_000u64)
        );
    }

    #[tokio::test]
    async fn test_pending_nonce_at() {
        let address: Address = "0x881d953652933937186bdf0680ed3c3c8a0162ab".parse().unwrap();
        let mut rpc = MockJsonRpc::new();
        rpc.expect_call()
            .withf(move |method, params| {
                method == "eth_getTransactionCount"
                    && params == &json!(["0x881d953652933937186bdf0680ed3c3c8a0162ab", "pending"])
            })
            .times(1)
            .returning(|_, _| Ok(json!("0x2a")));
        let client = OperaClient::new(rpc);
        assert_eq!(client.pending_nonce_at(address).await.unwrap(), U64::from(42));
    }

    #[tokio::test]
    async fn test_node_errors_are_preserved() {
        let mut rpc = MockJsonRpc::new();
        rpc.expect_call()
            .times(1)
            .returning(|_, _| Err(ApiError::NodeError(Some("nonce too low".to_string()))));
        let client = OperaClient::new(rpc);
        let error = client
            .send_raw_transaction(Bytes::from(vec![0xf8]))
            .await
            .unwrap_err();
        assert_matches!(error, ApiError::NodeError(Some(message)) if message == "nonce too low");

        let mut rpc = MockJsonRpc::new();
        rpc.expect_call()
            .times(1)
            .returning(|_, _| Ok(json!({"unexpected": true})));
        let client = OperaClient::new(rpc);
        assert_matches!(
            client.suggest_gas_price().await,
            Err(ApiError::NodeError(_))
        );
    }

    #[tokio::test]
    async fn test_latest_status() {
        let mut rpc = MockJsonRpc::new();
        rpc.expect_batch_call()
            .withf(|calls| {
                calls.len() == 2
                    && calls[0].0 == "eth_getBlockByNumber"
                    && calls[1].0 == "eth_syncing"
            })
            .times(1)
            .returning(|_| Ok(vec![Ok(latest_block()), Ok(json!(false))]));
        let client = OperaClient::new(rpc);
        let (header, sync_status) = client.latest_status().await.unwrap();
        assert_eq!(header.number(), 16);
        assert!(sync_status.synced);
        assert_eq!(sync_status.current_index, Some(16));

        let mut rpc = MockJsonRpc::new();
        rpc.expect_batch_call().times(1).returning(|_| {
            Ok(vec![
                Ok(latest_block()),
                Ok(json!({"startingBlock": "0x0", "currentBlock": "0x10", "highestBlock": "0x20"})),
            ])
        });
        let client = OperaClient::new(rpc);
        let (_, sync_status) = client.latest_status().await.unwrap();
        assert!(!sync_status.synced);
        assert_eq!(sync_status.target_index, Some(32));

        let mut rpc = MockJsonRpc::new();
        rpc.expect_batch_call()
            .times(1)
            .returning(|_| Ok(vec![Ok(Value::Null), Ok(json!(false))]));
        let client = OperaClient::new(rpc);
        assert_matches!(client.latest_status().await, Err(ApiError::NodeError(_)));
    }

    #[tokio::test]
    async fn test_peers() {
        let mut rpc = MockJsonRpc::new();
        rpc.expect_call()
            .withf(|method, _| method == "admin_peers")
            .times(1)
            .returning(|_, _| {
                Ok(json!([
                    {"id": "abc", "name": "go-opera/v1.1.0-rc.4", "enode": "enode://abc@10.0.0.1:5050"},
                    {"name": "nameless"},
                ]))
            });
        let client = OperaClient::new(rpc);
        let peers = client.peers().await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_id, "abc");
        assert_eq!(
            peers[0].metadata.as_ref().unwrap()["name"],
            json!("go-opera/v1.1.0-rc.4")
        );
    }

    /// Fake node answering every request with the method name, or an error for `fail`
    async fn fake_node() -> SocketAddr {
        fn respond(request: &Value) -> Value {
            let id = request["id"].clone();
            match request["method"].as_str() {
                Some("fail") => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32000, "message": "already known"}
                }),
                method => json!({"jsonrpc": "2.0", "id": id, "result": method}),
            }
        }

        let routes = warp::post()
            .and(warp::body::json())
            .map(|body: Value| match body {
                Value::Array(requests) => {
                    // Answer in reverse to exercise matching by id
                    let responses: Vec<_> = requests.iter().rev().map(respond).collect();
                    warp::reply::json(&responses)
                },
                request => warp::reply::json(&respond(&request)),
            });
        let (address, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        address
    }

    #[tokio::test]
    async fn test_http_json_rpc() {
        let address = fake_node().await;
        let url = Url::parse(&format!("http://{}", address)).unwrap();
        let rpc = HttpJsonRpc::new(url, Duration::from_secs(5)).unwrap();

        assert_eq!(assert_ok!(rpc.call("eth_chainId", json!([])).await), json!("eth_chainId"));
        assert_matches!(
            rpc.call("fail", json!([])).await,
            Err(ApiError::NodeError(Some(message))) if message.contains("already known")
        );

        let results = rpc
            .batch_call(vec![
                ("eth_gasPrice".to_string(), json!([])),
                ("fail".to_string(), json!([])),
                ("eth_syncing".to_string(), json!([])),
            ])
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &json!("eth_gasPrice"));
        assert_matches!(&results[1], Err(ApiError::NodeError(_)));
        assert_eq!(results[2].as_ref().unwrap(), &json!("eth_syncing"));
        rpc.close().await;
    }

    #[tokio::test]
    async fn test_http_json_rpc_unreachable() {
        let url = Url::parse("http://127.0.0.1:1").unwrap();
        let rpc = HttpJsonRpc::new(url, Duration::from_secs(1)).unwrap();
        assert_matches!(
            rpc.call("eth_gasPrice", json!([])).await,
            Err(ApiError::NodeError(_))
        );
    }
}
