// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Construction APIs
//!
//! The construction APIs break down transactions into composable parts that are
//! used to be generic across blockchains.  A flow of operations can be found
//! in the [specifications](https://www.rosetta-api.org/docs/construction_api_introduction.html)
//!
//! This is broken down in the following flow:
//!
//! * Preprocess (based on operations) gets the sender, and any client overrides
//! * Metadata fetches onchain information e.g. nonce and gas price
//! * Payloads generates an unsigned transaction and its EIP-155 signing hash
//! * Application outside signs the signing hash
//! * Combine puts the signature with the unsigned transaction
//! * Submit submits the signed transaction to the node
//!
//! There are also 3 other sometimes used APIs
//! * Derive (get an account from the public key)
//! * Parse (get the operations of a signed or unsigned transaction)
//! * Hash (get a hash of the transaction to lookup on chain)
//!
//! Note: there is an "online" mode and an "offline" mode.  The offline APIs can run without
//! a connection to a node.  The online ones (metadata and submit) need a connection to a node.

use crate::{
    codec::{decode_signature, SignedTransaction, UnsignedTransaction},
    common::{check_network, decode_hex, handle_request, parse_address, with_context},
    crypto::{derive_address, to_checksum},
    error::{ApiError, ApiResult},
    types::*,
    RosettaContext, TRANSFER_GAS_LIMIT,
};
use ethers::types::U256;
use tracing::{debug, trace, warn};
use warp::Filter;

pub fn combine_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "combine")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_combine))
}

pub fn derive_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "derive")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_derive))
}

pub fn hash_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "hash")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_hash))
}

pub fn metadata_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "metadata")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_metadata))
}

pub fn parse_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "parse")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_parse))
}

pub fn payloads_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "payloads")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_payloads))
}

pub fn preprocess_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "preprocess")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_preprocess))
}

pub fn submit_route(
    server_context: RosettaContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("construction" / "submit")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(server_context))
        .and_then(handle_request(construction_submit))
}

/// Transactions must be bound to the chain of the server
fn check_chain_id(chain_id: Option<u64>, server_context: &RosettaContext) -> ApiResult<()> {
    if chain_id == Some(server_context.chain_id()) {
        Ok(())
    } else {
        Err(ApiError::ChainIdMismatch)
    }
}

/// Construction combine command (OFFLINE)
///
/// This combines the single recoverable signature with the unsigned transaction
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructioncombine)
async fn construction_combine(
    request: ConstructionCombineRequest,
    server_context: RosettaContext,
) -> ApiResult<ConstructionCombineResponse> {
    debug!("/construction/combine");
    trace!("/construction/combine {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let unsigned = UnsignedTransaction::from_json(&request.unsigned_transaction)?;
    check_chain_id(Some(unsigned.chain_id.as_u64()), &server_context)?;

    // A transfer has exactly one signing payload, so exactly one signature
    if request.signatures.len() != 1 {
        return Err(ApiError::UnsupportedSignatureCount(Some(
            request.signatures.len(),
        )));
    }
    let signature = &request.signatures[0];
    if signature.signature_type != SignatureType::EcdsaRecovery {
        return Err(ApiError::UnsupportedSignatureType(Some(format!(
            "{:?} is not supported, signatures must be ecdsa_recovery",
            signature.signature_type
        ))));
    }

    let signing_hash = unsigned.signing_hash()?;
    let payload = decode_hex(&signature.signing_payload.hex_bytes)?;
    if !payload.is_empty() && payload != signing_hash {
        return Err(ApiError::InvalidSignature(Some(
            "Signing payload doesn't match the unsigned transaction".to_string(),
        )));
    }

    // The payload's signer, when given, must be the sender
    let sender = parse_address(&unsigned.from)?;
    let signing_payload = &signature.signing_payload;
    let signers = signing_payload.address.iter().chain(
        signing_payload
            .account_identifier
            .iter()
            .map(|account| &account.address),
    );
    for signer in signers {
        if parse_address(signer).ok() != Some(sender) {
            return Err(ApiError::InvalidSignature(Some(format!(
                "Signing payload is for {} but the transaction is from {}",
                signer, unsigned.from
            ))));
        }
    }

    let signed = unsigned.sign(&decode_signature(&signature.hex_bytes)?)?;
    Ok(ConstructionCombineResponse {
        signed_transaction: signed.to_json()?,
    })
}

/// Construction derive command (OFFLINE)
///
/// Derive an account from a secp256k1 public key
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionderive)
async fn construction_derive(
    request: ConstructionDeriveRequest,
    server_context: RosettaContext,
) -> ApiResult<ConstructionDeriveResponse> {
    debug!("/construction/derive");
    trace!("/construction/derive {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let address = derive_address(&request.public_key)?;
    Ok(ConstructionDeriveResponse {
        account_identifier: Some(address.into()),
    })
}

/// Construction hash command (OFFLINE)
///
/// Hash a signed transaction, ignoring any hash carried in it
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionhash)
async fn construction_hash(
    request: ConstructionHashRequest,
    server_context: RosettaContext,
) -> ApiResult<TransactionIdentifierResponse> {
    debug!("/construction/hash");
    trace!("/construction/hash {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let signed = SignedTransaction::from_json(&request.signed_transaction)?;
    Ok(TransactionIdentifierResponse {
        transaction_identifier: TransactionIdentifier {
            hash: format!("{:?}", signed.hash()),
        },
        metadata: None,
    })
}

/// Construction metadata command (ONLINE)
///
/// Retrieve the nonce and gas price of the sender, unless they were given on preprocess.
/// The two lookups are independent, and run concurrently.
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionmetadata)
async fn construction_metadata(
    request: ConstructionMetadataRequest,
    server_context: RosettaContext,
) -> ApiResult<ConstructionMetadataResponse> {
    debug!("/construction/metadata");
    trace!("/construction/metadata {:?}", request);
    check_network(request.network_identifier, &server_context)?;
    let node = server_context.node()?;

    let options = request
        .options
        .ok_or_else(|| ApiError::InvalidInput(Some("Missing metadata options".to_string())))?;
    let sender = parse_address(&options.from)?;
    let gas_limit = options
        .gas_limit
        .unwrap_or_else(|| U256::from(TRANSFER_GAS_LIMIT));

    let (gas_price, nonce) = match (options.gas_price, options.nonce) {
        (Some(gas_price), Some(nonce)) => (gas_price, nonce),
        (Some(gas_price), None) => (gas_price, node.pending_nonce_at(sender).await?),
        (None, Some(nonce)) => (node.suggest_gas_price().await?, nonce),
        (None, None) => {
            tokio::try_join!(node.suggest_gas_price(), node.pending_nonce_at(sender))?
        },
    };

    let suggested_fee = Amount::suggested_fee(gas_price, gas_limit)?;
    Ok(ConstructionMetadataResponse {
        metadata: ConstructionMetadata {
            nonce,
            gas_price,
            gas_limit,
        },
        suggested_fee: Some(vec![suggested_fee]),
    })
}

/// Construction parse command (OFFLINE)
///
/// Parses a signed or unsigned transaction back into its operations.  The signer of a signed
/// transaction is recovered from its signature.
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionparse)
async fn construction_parse(
    request: ConstructionParseRequest,
    server_context: RosettaContext,
) -> ApiResult<ConstructionParseResponse> {
    debug!("/construction/parse");
    trace!("/construction/parse {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let (unsigned, signers) = if request.signed {
        let signed = SignedTransaction::from_json(&request.transaction)?;
        check_chain_id(signed.chain_id(), &server_context)?;
        let unsigned = signed.unsigned()?;
        let signer = AccountIdentifier::from(unsigned.sender()?);
        (unsigned, vec![signer])
    } else {
        let unsigned = UnsignedTransaction::from_json(&request.transaction)?;
        check_chain_id(Some(unsigned.chain_id.as_u64()), &server_context)?;
        (unsigned, vec![])
    };

    let sender = unsigned.sender()?;
    let receiver = unsigned.receiver()?;
    let operations = vec![
        Operation::debit(0, sender, unsigned.value),
        Operation::credit(1, 0, receiver, unsigned.value),
    ];

    Ok(ConstructionParseResponse {
        operations,
        account_identifier_signers: Some(signers),
        metadata: Some(ParseMetadata {
            nonce: unsigned.nonce,
            gas_price: unsigned.gas_price,
            chain_id: unsigned.chain_id,
        }),
    })
}

/// Construction payloads command (OFFLINE)
///
/// Constructs the unsigned transaction and the one signing payload for its sender
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionpayloads)
async fn construction_payloads(
    request: ConstructionPayloadsRequest,
    server_context: RosettaContext,
) -> ApiResult<ConstructionPayloadsResponse> {
    debug!("/construction/payloads");
    trace!("/construction/payloads {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let transfer = Transfer::extract_transfer(&server_context.catalog, &request.operations)?;
    let metadata = request.metadata.ok_or(ApiError::MissingPayloadMetadata)?;

    let unsigned = UnsignedTransaction::new(&transfer, &metadata, server_context.chain_id());
    let signing_hash = unsigned.signing_hash()?;

    Ok(ConstructionPayloadsResponse {
        unsigned_transaction: unsigned.to_json()?,
        payloads: vec![SigningPayload::ecdsa_recovery(
            transfer.sender,
            &signing_hash,
        )],
    })
}

/// Construction preprocess command (OFFLINE)
///
/// Validates the transfer and finds its sender, the only thing metadata needs to know
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionpreprocess)
async fn construction_preprocess(
    request: ConstructionPreprocessRequest,
    server_context: RosettaContext,
) -> ApiResult<ConstructionPreprocessResponse> {
    debug!("/construction/preprocess");
    trace!("/construction/preprocess {:?}", request);
    check_network(request.network_identifier, &server_context)?;

    let transfer = Transfer::extract_transfer(&server_context.catalog, &request.operations)?;
    let overrides = request.metadata.unwrap_or_default();

    Ok(ConstructionPreprocessResponse {
        options: Some(ConstructionOptions {
            from: to_checksum(&transfer.sender),
            gas_price: overrides.gas_price,
            gas_limit: overrides.gas_limit,
            nonce: overrides.nonce,
        }),
        required_public_keys: None,
    })
}

/// Construction submit command (ONLINE)
///
/// Submits the raw transaction to the node, rejections are returned as node errors
///
/// [API Spec](https://www.rosetta-api.org/docs/ConstructionApi.html#constructionsubmit)
async fn construction_submit(
    request: ConstructionSubmitRequest,
    server_context: RosettaContext,
) -> ApiResult<TransactionIdentifierResponse> {
    debug!("/construction/submit");
    trace!("/construction/submit {:?}", request);
    check_network(request.network_identifier, &server_context)?;
    let node = server_context.node()?;

    let signed = SignedTransaction::from_json(&request.signed_transaction)?;
    check_chain_id(signed.chain_id(), &server_context)?;

    let hash = signed.hash();
    let node_hash = node.send_raw_transaction(signed.rlp_bytes()).await?;
    if node_hash != hash {
        warn!(
            "Node reported hash {:?} for transaction {:?}",
            node_hash, hash
        );
    }

    Ok(TransactionIdentifierResponse {
        transaction_identifier: TransactionIdentifier {
            hash: format!("{:?}", hash),
        },
        metadata: None,
    })
}
