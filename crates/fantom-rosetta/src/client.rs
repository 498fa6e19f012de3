// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Client for the Rosetta API, along with helpers to run a full transfer through the
//! construction flow with a local key

use crate::{
    common::{decode_hex, native_coin},
    crypto::public_key_address,
    types::*,
};
use anyhow::{anyhow, bail};
use ethers::types::{Address, U256};
use reqwest::{header::CONTENT_TYPE, Client as ReqwestClient};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use url::Url;

/// A failed call, carrying the Rosetta error the server responded with
#[derive(Debug, thiserror::Error)]
#[error("Failed API with: {0:?}")]
pub struct FailedApi(pub Error);

/// Client for testing & interacting with a Rosetta service
#[derive(Debug, Clone)]
pub struct RosettaClient {
    address: Url,
    inner: ReqwestClient,
}

impl RosettaClient {
    /// Creates a new client from a URL e.g. `http://localhost:8080`
    pub fn new(address: Url) -> RosettaClient {
        RosettaClient {
            address,
            inner: ReqwestClient::new(),
        }
    }

    pub async fn combine(
        &self,
        request: &ConstructionCombineRequest,
    ) -> anyhow::Result<ConstructionCombineResponse> {
        self.make_call("construction/combine", request).await
    }

    pub async fn derive(
        &self,
        request: &ConstructionDeriveRequest,
    ) -> anyhow::Result<ConstructionDeriveResponse> {
        self.make_call("construction/derive", request).await
    }

    pub async fn hash(
        &self,
        request: &ConstructionHashRequest,
    ) -> anyhow::Result<TransactionIdentifierResponse> {
        self.make_call("construction/hash", request).await
    }

    pub async fn metadata(
        &self,
        request: &ConstructionMetadataRequest,
    ) -> anyhow::Result<ConstructionMetadataResponse> {
        self.make_call("construction/metadata", request).await
    }

    pub async fn parse(
        &self,
        request: &ConstructionParseRequest,
    ) -> anyhow::Result<ConstructionParseResponse> {
        self.make_call("construction/parse", request).await
    }

    pub async fn payloads(
        &self,
        request: &ConstructionPayloadsRequest,
    ) -> anyhow::Result<ConstructionPayloadsResponse> {
        self.make_call("construction/payloads", request).await
    }

    pub async fn preprocess(
        &self,
        request: &ConstructionPreprocessRequest,
    ) -> anyhow::Result<ConstructionPreprocessResponse> {
        self.make_call("construction/preprocess", request).await
    }

    pub async fn submit(
        &self,
        request: &ConstructionSubmitRequest,
    ) -> anyhow::Result<TransactionIdentifierResponse> {
        self.make_call("construction/submit", request).await
    }

    pub async fn network_list(&self) -> anyhow::Result<NetworkListResponse> {
        self.make_call("network/list", &MetadataRequest::default())
            .await
    }

    pub async fn network_options(
        &self,
        request: &NetworkRequest,
    ) -> anyhow::Result<NetworkOptionsResponse> {
        self.make_call("network/options", request).await
    }

    pub async fn network_status(
        &self,
        request: &NetworkRequest,
    ) -> anyhow::Result<NetworkStatusResponse> {
        self.make_call("network/status", request).await
    }

    async fn make_call<'a, I: Serialize + Debug, O: DeserializeOwned>(
        &'a self,
        path: &'static str,
        request: &'a I,
    ) -> anyhow::Result<O> {
        let response = self
            .inner
            .post(self.address.join(path)?)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(request)?)
            .send()
            .await?;
        if !response.status().is_success() {
            let error: Error = response.json().await?;
            return Err(FailedApi(error).into());
        }

        Ok(response.json().await?)
    }

    /// Builds a signed transfer of `amount` FTM from the key's account to `receiver`
    ///
    /// Runs derive, preprocess, payloads, combine and parse, checking that the parsed
    /// operations match the requested ones.  `metadata` normally comes from
    /// `/construction/metadata`, which needs an online server.
    pub async fn sign_transfer(
        &self,
        network_identifier: NetworkIdentifier,
        private_key: &libsecp256k1::SecretKey,
        receiver: Address,
        amount: U256,
        metadata: ConstructionMetadata,
    ) -> anyhow::Result<String> {
        let sender = self
            .derive_account(network_identifier.clone(), private_key)
            .await?;
        let operations = vec![
            Operation::debit(0, sender, amount),
            Operation::credit(1, 0, receiver, amount),
        ];

        let options = self
            .preprocess(&ConstructionPreprocessRequest {
                network_identifier: network_identifier.clone(),
                operations: operations.clone(),
                metadata: None,
            })
            .await?
            .options
            .ok_or_else(|| anyhow!("Preprocess returned no options"))?;
        if options.from.to_lowercase() != format!("{:?}", sender) {
            bail!("Preprocess returned sender {} instead of {:?}", options.from, sender);
        }

        let payloads = self
            .payloads(&ConstructionPayloadsRequest {
                network_identifier: network_identifier.clone(),
                operations: operations.clone(),
                metadata: Some(metadata),
                public_keys: None,
            })
            .await?;
        self.check_parse(
            network_identifier.clone(),
            false,
            payloads.unsigned_transaction.clone(),
            &operations,
            &[],
        )
        .await?;

        let [payload] = payloads.payloads.as_slice() else {
            bail!("Expected exactly one signing payload, got {}", payloads.payloads.len());
        };
        let signature = sign_payload(private_key, payload)?;
        let signed_transaction = self
            .combine(&ConstructionCombineRequest {
                network_identifier: network_identifier.clone(),
                unsigned_transaction: payloads.unsigned_transaction,
                signatures: vec![signature],
            })
            .await?
            .signed_transaction;

        self.check_parse(
            network_identifier,
            true,
            signed_transaction.clone(),
            &operations,
            &[AccountIdentifier::from(sender)],
        )
        .await?;
        Ok(signed_transaction)
    }

    /// Runs a full transfer through an online server, returning the submitted hash
    pub async fn transfer(
        &self,
        network_identifier: NetworkIdentifier,
        private_key: &libsecp256k1::SecretKey,
        receiver: Address,
        amount: U256,
    ) -> anyhow::Result<TransactionIdentifier> {
        let sender = public_key_address(&libsecp256k1::PublicKey::from_secret_key(private_key));
        let response = self
            .metadata(&ConstructionMetadataRequest {
                network_identifier: network_identifier.clone(),
                options: Some(ConstructionOptions {
                    from: AccountIdentifier::from(sender).address,
                    gas_price: None,
                    gas_limit: None,
                    nonce: None,
                }),
                public_keys: None,
            })
            .await?;

        let fee = response
            .suggested_fee
            .as_deref()
            .and_then(|fees| fees.first())
            .ok_or_else(|| anyhow!("Metadata returned no suggested fee"))?;
        if fee.currency != native_coin() {
            bail!("Fee should always be the native coin, got {:?}", fee.currency);
        }

        let signed_transaction = self
            .sign_transfer(
                network_identifier.clone(),
                private_key,
                receiver,
                amount,
                response.metadata,
            )
            .await?;
        let submitted = self
            .submit(&ConstructionSubmitRequest {
                network_identifier: network_identifier.clone(),
                signed_transaction: signed_transaction.clone(),
            })
            .await?
            .transaction_identifier;

        let hashed = self
            .hash(&ConstructionHashRequest {
                network_identifier,
                signed_transaction,
            })
            .await?
            .transaction_identifier;
        if submitted != hashed {
            bail!("Submitted hash {} doesn't match {}", submitted.hash, hashed.hash);
        }
        Ok(submitted)
    }

    /// Derives the account of a private key through `/construction/derive`
    async fn derive_account(
        &self,
        network_identifier: NetworkIdentifier,
        private_key: &libsecp256k1::SecretKey,
    ) -> anyhow::Result<Address> {
        let public_key = libsecp256k1::PublicKey::from_secret_key(private_key);
        let account = self
            .derive(&ConstructionDeriveRequest {
                network_identifier,
                public_key: secp256k1_public_key(&public_key),
                metadata: None,
            })
            .await?
            .account_identifier
            .ok_or_else(|| anyhow!("Derive returned no account"))?;
        Ok(account.account_address()?)
    }

    async fn check_parse(
        &self,
        network_identifier: NetworkIdentifier,
        signed: bool,
        transaction: String,
        expected_operations: &[Operation],
        expected_signers: &[AccountIdentifier],
    ) -> anyhow::Result<()> {
        let response = self
            .parse(&ConstructionParseRequest {
                network_identifier,
                signed,
                transaction,
            })
            .await?;
        if response.operations != expected_operations {
            bail!(
                "Parsed operations {:?} don't match {:?}",
                response.operations,
                expected_operations
            );
        }
        let signers = response.account_identifier_signers.unwrap_or_default();
        if signers != expected_signers {
            bail!("Parsed signers {:?} don't match {:?}", signers, expected_signers);
        }
        Ok(())
    }
}

/// Compressed SEC1 form of a secp256k1 public key
pub fn secp256k1_public_key(public_key: &libsecp256k1::PublicKey) -> PublicKey {
    PublicKey {
        hex_bytes: hex::encode(public_key.serialize_compressed()),
        curve_type: CurveType::Secp256k1,
    }
}

/// Signs a payload into a 65 byte recoverable signature `r || s || recovery id`
pub fn sign_payload(
    private_key: &libsecp256k1::SecretKey,
    payload: &SigningPayload,
) -> anyhow::Result<Signature> {
    let hash: [u8; 32] = decode_hex(&payload.hex_bytes)?
        .try_into()
        .map_err(|_| anyhow!("Signing payload must be 32 bytes"))?;
    let (signature, recovery_id) =
        libsecp256k1::sign(&libsecp256k1::Message::parse(&hash), private_key);

    let mut bytes = signature.serialize().to_vec();
    bytes.push(recovery_id.serialize());
    Ok(Signature {
        signing_payload: payload.clone(),
        public_key: secp256k1_public_key(&libsecp256k1::PublicKey::from_secret_key(
            private_key,
        )),
        signature_type: SignatureType::EcdsaRecovery,
        hex_bytes: hex::encode(bytes),
    })
}
