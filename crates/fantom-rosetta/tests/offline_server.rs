// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use ethers::types::{Address, U256, U64};
use fantom_rosetta::{
    bootstrap,
    client::{FailedApi, RosettaClient},
    config::{Configuration, Network},
    types::{ConstructionHashRequest, ConstructionMetadata, NetworkRequest},
    RosettaContext,
};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use url::Url;

async fn start_offline_server(network: Network) -> (RosettaClient, CancellationToken) {
    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let (address, _server) = bootstrap(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        RosettaContext::new(Configuration::offline(network, 0), None),
        async move { server_shutdown.cancelled().await },
    )
    .unwrap();

    let url = Url::parse(&format!("http://{}", address)).unwrap();
    (RosettaClient::new(url), shutdown)
}

#[tokio::test]
async fn test_offline_transfer() {
    let (client, shutdown) = start_offline_server(Network::Testnet).await;
    let network_identifier = client
        .network_list()
        .await
        .unwrap()
        .network_identifiers
        .remove(0);
    assert_eq!(network_identifier.network, "Testnet");

    let secret = libsecp256k1::SecretKey::parse(&[0x42; 32]).unwrap();
    let receiver = Address::repeat_byte(0x11);
    let signed_transaction = client
        .sign_transfer(
            network_identifier.clone(),
            &secret,
            receiver,
            U256::exp10(18),
            ConstructionMetadata {
                nonce: U64::from(5u64),
                gas_price: U256::from(1_000_000_000u64),
                gas_limit: U256::from(21_000u64),
            },
        )
        .await
        .unwrap();

    let hash = client
        .hash(&ConstructionHashRequest {
            network_identifier,
            signed_transaction,
        })
        .await
        .unwrap()
        .transaction_identifier
        .hash;
    assert_eq!(hash.len(), 66);
    assert!(hash.starts_with("0x"));

    shutdown.cancel();
}

#[tokio::test]
async fn test_offline_server_rejects_online_calls() {
    let (client, shutdown) = start_offline_server(Network::Mainnet).await;
    let network_identifier = client.network_list().await.unwrap().network_identifiers[0].clone();

    let options = client
        .network_options(&NetworkRequest {
            network_identifier: network_identifier.clone(),
        })
        .await
        .unwrap();
    assert_eq!(options.allow.errors.len(), 14);

    let error = client
        .network_status(&NetworkRequest { network_identifier })
        .await
        .unwrap_err();
    let FailedApi(error) = error.downcast_ref::<FailedApi>().unwrap();
    assert_eq!(error.code, 1);
    assert!(!error.retriable);

    shutdown.cancel();
}
