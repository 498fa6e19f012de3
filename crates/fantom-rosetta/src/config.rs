// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Server configuration, read from the environment
//!
//! Every setting is an environment variable, and can also be given as a flag.

use crate::types::{BlockIdentifier, NetworkIdentifier};
use clap::Parser;
use std::{convert::TryFrom, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

pub const DEFAULT_OPERA_URL: &str = "http://localhost:18545";
pub const DEFAULT_OPERA_BINARY: &str = "/app/opera";
pub const DEFAULT_NODE_TIMEOUT_SECS: u64 = 30;

const MAINNET_GENESIS_HASH: &str =
    "0x00000000000003e83fddf1e9330f0a8691d9f0b2af57b38c3bb85488488a40df";
const TESTNET_GENESIS_HASH: &str =
    "0x00000000000003e8c717f00dc4306a6ff72eabc9a6ec6e4a46bf6ba044ca88d2";
const MAINNET_OPERA_ARGUMENTS: &str = "--config=/app/fantom/opera.toml --genesis=/data/mainnet.g";
const TESTNET_OPERA_ARGUMENTS: &str = "--config=/app/fantom/opera.toml --genesis=/data/testnet.g";

/// Fantom Rosetta API Server
///
/// Provides an implementation of [Rosetta](https://www.rosetta-api.org/docs/Reference.html) on
/// Fantom Opera.
#[derive(Clone, Debug, Default, Parser)]
#[clap(name = "fantom-rosetta", author, version, propagate_version = true)]
pub struct RosettaServerArgs {
    /// ONLINE to serve every endpoint, OFFLINE to only serve the ones that need no node
    #[clap(long, env = "MODE")]
    pub mode: Option<String>,
    /// MAINNET or TESTNET
    #[clap(long, env = "NETWORK")]
    pub network: Option<String>,
    /// Port the Rosetta API listens on
    #[clap(long, env = "PORT")]
    pub port: Option<String>,
    /// URL of an already running Opera node.  When unset a local node is started
    #[clap(long, env = "OPERA")]
    pub opera: Option<String>,
    /// Skip `admin` RPC calls, which hosted nodes usually don't serve
    #[clap(long, env = "SKIP_ADMIN")]
    pub skip_admin: Option<String>,
    /// Timeout of every call to the node
    #[clap(long, env = "NODE_TIMEOUT_SECS", default_value_t = DEFAULT_NODE_TIMEOUT_SECS)]
    pub node_timeout_secs: u64,
    /// Opera binary to run when no remote node is configured
    #[clap(long, env = "OPERA_BINARY", default_value = DEFAULT_OPERA_BINARY)]
    pub opera_binary: PathBuf,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("MODE must be populated")]
    MissingMode,
    #[error("{0} is not a valid mode")]
    InvalidMode(String),
    #[error("NETWORK must be populated")]
    MissingNetwork,
    #[error("{0} is not a valid network")]
    InvalidNetwork(String),
    #[error("PORT must be populated")]
    MissingPort,
    #[error("unable to parse port {0}")]
    InvalidPort(String),
    #[error("unable to parse SKIP_ADMIN {0}")]
    InvalidSkipAdmin(String),
    #[error("unable to parse OPERA {0}")]
    InvalidOperaUrl(String),
}

/// Whether the server may reach out to a node
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Online,
    Offline,
}

/// Fantom networks the server can be started for
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 0xfa,
            Network::Testnet => 0xfa2,
        }
    }

    pub fn network_identifier(&self) -> NetworkIdentifier {
        NetworkIdentifier::new(match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
        })
    }

    pub fn genesis_block_identifier(&self) -> BlockIdentifier {
        let hash = match self {
            Network::Mainnet => MAINNET_GENESIS_HASH,
            Network::Testnet => TESTNET_GENESIS_HASH,
        };
        BlockIdentifier {
            index: 0,
            hash: hash.to_string(),
        }
    }

    pub fn opera_arguments(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_OPERA_ARGUMENTS,
            Network::Testnet => TESTNET_OPERA_ARGUMENTS,
        }
    }
}

/// Validated server configuration
#[derive(Clone, Debug)]
pub struct Configuration {
    pub mode: Mode,
    pub network: NetworkIdentifier,
    pub genesis_block_identifier: BlockIdentifier,
    pub chain_id: u64,
    pub opera_url: String,
    /// The node is run by someone else, so no local node is started
    pub remote_opera: bool,
    pub opera_arguments: String,
    pub opera_binary: PathBuf,
    pub port: u16,
    pub skip_admin: bool,
    pub node_timeout: Duration,
}

impl Configuration {
    /// Configuration of a server that never talks to a node
    pub fn offline(network: Network, port: u16) -> Self {
        Configuration {
            mode: Mode::Offline,
            network: network.network_identifier(),
            genesis_block_identifier: network.genesis_block_identifier(),
            chain_id: network.chain_id(),
            opera_url: DEFAULT_OPERA_URL.to_string(),
            remote_opera: false,
            opera_arguments: network.opera_arguments().to_string(),
            opera_binary: PathBuf::from(DEFAULT_OPERA_BINARY),
            port,
            skip_admin: false,
            node_timeout: Duration::from_secs(DEFAULT_NODE_TIMEOUT_SECS),
        }
    }

    pub fn is_online(&self) -> bool {
        self.mode == Mode::Online
    }
}

/// Treats an empty variable the same as an unset one
fn populated(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Booleans in the format accepted by Go's `strconv.ParseBool`
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

impl TryFrom<RosettaServerArgs> for Configuration {
    type Error = ConfigError;

    fn try_from(args: RosettaServerArgs) -> Result<Self, Self::Error> {
        let mode = match populated(&args.mode) {
            Some("ONLINE") => Mode::Online,
            Some("OFFLINE") => Mode::Offline,
            Some(other) => return Err(ConfigError::InvalidMode(other.to_string())),
            None => return Err(ConfigError::MissingMode),
        };

        let network = match populated(&args.network) {
            Some("MAINNET") => Network::Mainnet,
            Some("TESTNET") => Network::Testnet,
            Some(other) => return Err(ConfigError::InvalidNetwork(other.to_string())),
            None => return Err(ConfigError::MissingNetwork),
        };

        let (opera_url, remote_opera) = match populated(&args.opera) {
            Some(url) => {
                Url::parse(url).map_err(|_| ConfigError::InvalidOperaUrl(url.to_string()))?;
                (url.to_string(), true)
            },
            None => (DEFAULT_OPERA_URL.to_string(), false),
        };

        let skip_admin = match populated(&args.skip_admin) {
            Some(value) => {
                parse_bool(value).ok_or_else(|| ConfigError::InvalidSkipAdmin(value.to_string()))?
            },
            None => false,
        };

        let port = match populated(&args.port) {
            Some(port) => port
                .parse::<u16>()
                .ok()
                .filter(|port| *port > 0)
                .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?,
            None => return Err(ConfigError::MissingPort),
        };

        Ok(Configuration {
            mode,
            network: network.network_identifier(),
            genesis_block_identifier: network.genesis_block_identifier(),
            chain_id: network.chain_id(),
            opera_url,
            remote_opera,
            opera_arguments: network.opera_arguments().to_string(),
            opera_binary: args.opera_binary,
            port,
            skip_admin,
            node_timeout: Duration::from_secs(args.node_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: &str, network: &str, port: &str) -> RosettaServerArgs {
        let populate = |value: &str| (!value.is_empty()).then(|| value.to_string());
        RosettaServerArgs {
            mode: populate(mode),
            network: populate(network),
            port: populate(port),
            node_timeout_secs: DEFAULT_NODE_TIMEOUT_SECS,
            opera_binary: PathBuf::from(DEFAULT_OPERA_BINARY),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_configuration() {
        let config = Configuration::try_from(args("ONLINE", "MAINNET", "1000")).unwrap();
        assert_eq!(config.mode, Mode::Online);
        assert_eq!(config.network, NetworkIdentifier::new("Mainnet"));
        assert_eq!(config.network.blockchain, "Fantom");
        assert_eq!(config.chain_id, 0xfa);
        assert_eq!(config.genesis_block_identifier.index, 0);
        assert_eq!(config.genesis_block_identifier.hash, MAINNET_GENESIS_HASH);
        assert_eq!(config.opera_url, "http://localhost:18545");
        assert!(!config.remote_opera);
        assert!(!config.skip_admin);
        assert_eq!(config.port, 1000);
        assert_eq!(config.opera_arguments, MAINNET_OPERA_ARGUMENTS);

        let mut testnet = args("OFFLINE", "TESTNET", "1000");
        testnet.opera = Some("http://opera:8545".to_string());
        testnet.skip_admin = Some("T".to_string());
        let config = Configuration::try_from(testnet).unwrap();
        assert_eq!(config.mode, Mode::Offline);
        assert_eq!(config.network.network, "Testnet");
        assert_eq!(config.chain_id, 0xfa2);
        assert_eq!(config.genesis_block_identifier.hash, TESTNET_GENESIS_HASH);
        assert_eq!(config.opera_url, "http://opera:8545");
        assert!(config.remote_opera);
        assert!(config.skip_admin);
        assert_eq!(config.opera_arguments, TESTNET_OPERA_ARGUMENTS);
    }

    #[test]
    fn test_configuration_errors() {
        let cases = [
            (args("", "MAINNET", "1000"), "MODE must be populated"),
            (args("BAD MODE", "MAINNET", "1000"), "BAD MODE is not a valid mode"),
            (args("ONLINE", "", "1000"), "NETWORK must be populated"),
            (args("ONLINE", "bad network", "1000"), "bad network is not a valid network"),
            (args("ONLINE", "MAINNET", ""), "PORT must be populated"),
            (args("ONLINE", "MAINNET", "bad port"), "unable to parse port bad port"),
            (args("ONLINE", "MAINNET", "0"), "unable to parse port 0"),
            (args("ONLINE", "MAINNET", "-1"), "unable to parse port -1"),
        ];
        for (args, message) in cases {
            let error = Configuration::try_from(args).unwrap_err();
            assert_eq!(error.to_string(), message);
        }

        let mut bad_skip_admin = args("ONLINE", "MAINNET", "1000");
        bad_skip_admin.skip_admin = Some("yes".to_string());
        assert_eq!(
            Configuration::try_from(bad_skip_admin).unwrap_err(),
            ConfigError::InvalidSkipAdmin("yes".to_string())
        );
    }

    #[test]
    fn test_parse_bool() {
        for value in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(value), Some(true));
        }
        for value in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(value), Some(false));
        }
        assert_eq!(parse_bool("tRuE"), None);
    }

    #[test]
    fn test_parse_flags() {
        let args = RosettaServerArgs::try_parse_from([
            "fantom-rosetta",
            "--mode",
            "OFFLINE",
            "--network",
            "TESTNET",
            "--port",
            "8080",
            "--node-timeout-secs",
            "5",
        ])
        .unwrap();
        let config = Configuration::try_from(args).unwrap();
        assert!(!config.is_online());
        assert_eq!(config.port, 8080);
        assert_eq!(config.node_timeout, Duration::from_secs(5));
        assert_eq!(config.opera_binary, PathBuf::from(DEFAULT_OPERA_BINARY));
    }
}
