// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0


use crate::{
    config::{Configuration, Mode, Network},
    node::{MockNodeGateway, NodeGateway},
    routes,
    types::NetworkIdentifier,
    RosettaContext,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use warp::http::{header::CONTENT_TYPE, StatusCode};

/// Account and key of the recorded testnet transfer
pub const SENDER: &str = "0x881d953652933937186BDf0680eD3c3c8a0162Ab";
pub const SENDER_PUBLIC_KEY: &str =
    "033f1e373efd92eb487fccdb1944e2b8aa5f6519a966cb924517f07dbd1a1e6932";
pub const RECEIVER: &str = "0x57B414a0332B5CaB885a451c2a28a07d1e9b8a8d";
pub const AMOUNT: u64 = 42894881044106498;

pub fn new_test_context(node: Option<MockNodeGateway>) -> TestContext {
    new_test_context_with_config(Configuration::offline(Network::Testnet, 8080), node)
}

pub fn new_test_context_with_config(
    mut config: Configuration,
    node: Option<MockNodeGateway>,
) -> TestContext {
    if node.is_some() {
        config.mode = Mode::Online;
    }
    let node = node.map(|node| Arc::new(node) as Arc<dyn NodeGateway>);
    TestContext {
        expect_status_code: StatusCode::OK,
        inner: RosettaContext::new(config, node),
    }
}

#[derive(Clone, Debug)]
pub struct TestContext {
    expect_status_code: StatusCode,
    pub inner: RosettaContext,
}

impl TestContext {
    pub fn expect_status_code(&self, status_code: StatusCode) -> Self {
        let mut ret = self.clone();
        ret.expect_status_code = status_code;
        ret
    }

    pub fn network(&self) -> NetworkIdentifier {
        self.inner.config.network.clone()
    }

    pub async fn post(&self, path: &str, body: Value) -> Value {
        let resp = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(&routes(self.inner.clone()))
            .await;

        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        let body = serde_json::from_slice(resp.body()).expect("response body is JSON");
        assert_eq!(
            self.expect_status_code,
            resp.status(),
            "\nresponse: {}",
            pretty(&body)
        );
        body
    }

    /// Posts a typed request, decoding the typed response
    pub async fn call<I: Serialize, O: DeserializeOwned>(&self, path: &str, request: &I) -> O {
        let body = self
            .post(path, serde_json::to_value(request).unwrap())
            .await;
        serde_json::from_value(body).unwrap()
    }

    /// Posts a request expected to fail, returning the Rosetta error code
    pub async fn error_code<I: Serialize>(&self, path: &str, request: &I) -> u64 {
        let ctx = if self.expect_status_code == StatusCode::OK {
            self.expect_status_code(StatusCode::BAD_REQUEST)
        } else {
            self.clone()
        };
        let body = ctx
            .post(path, serde_json::to_value(request).unwrap())
            .await;
        body["code"].as_u64().expect("error has a code")
    }
}

pub fn pretty(val: &Value) -> String {
    serde_json::to_string_pretty(val).unwrap() + "\n"
}
