// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use fantom_rosetta::{
    bootstrap,
    config::{Configuration, RosettaServerArgs},
    node::{HttpJsonRpc, NodeGateway, OperaClient},
    opera::start_opera,
    RosettaContext,
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(RosettaServerArgs::parse()).await {
        error!("Rosetta server failed: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: RosettaServerArgs) -> anyhow::Result<()> {
    let config = Configuration::try_from(args)?;
    info!("Starting {:?} Rosetta server for {}", config.mode, config.network.network);
    let shutdown = CancellationToken::new();

    let mut node = None;
    let mut opera = None;
    if config.is_online() {
        let rpc = HttpJsonRpc::new(Url::parse(&config.opera_url)?, config.node_timeout)?;
        node = Some(Arc::new(OperaClient::new(rpc)));

        if !config.remote_opera {
            let binary = config.opera_binary.clone();
            let arguments = config.opera_arguments.clone();
            let token = shutdown.clone();
            opera = Some(tokio::spawn(async move {
                start_opera(&binary, &arguments, token).await
            }));
        }
    }

    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let gateway = node
        .clone()
        .map(|client| client as Arc<dyn NodeGateway>);
    let server_shutdown = shutdown.clone();
    let (_, server) = bootstrap(
        address,
        RosettaContext::new(config, gateway),
        async move { server_shutdown.cancelled().await },
    )?;

    match opera.as_mut() {
        Some(supervisor) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("unable to listen for interrupts")?
                },
                exited = supervisor => {
                    // The node stopped on its own, there is nothing left to serve
                    shutdown.cancel();
                    server.await?;
                    let status = exited??;
                    anyhow::bail!("Opera exited unexpectedly with {}", status);
                },
            }
        },
        None => tokio::signal::ctrl_c()
            .await
            .context("unable to listen for interrupts")?,
    }

    info!("Shutting down");
    shutdown.cancel();
    server.await?;
    if let Some(supervisor) = opera {
        supervisor.await??;
    }
    if let Some(client) = node {
        client.close().await;
    }
    Ok(())
}
