// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Encoding of legacy (type 0) Opera transactions
//!
//! Two JSON forms travel through the construction API:
//!
//! * [`UnsignedTransaction`], the canonical form returned by `/construction/payloads`.  It holds
//!   every field of the EIP-155 signing hash, so it is enough to resume construction offline.
//! * [`SignedTransaction`], the go-ethereum JSON form of a transaction with `v`, `r` and `s`.
//!
//! The signing hash is `keccak256(rlp([nonce, gas_price, gas, to, value, data, chain_id, 0, 0]))`
//! and the transaction hash is `keccak256(rlp([nonce, gas_price, gas, to, value, data, v, r, s]))`.

use crate::{
    common::{decode_hex, parse_address},
    crypto::{keccak256, recover_signer, to_checksum, SIGNATURE_LENGTH},
    error::{ApiError, ApiResult},
    types::{ConstructionMetadata, Transfer},
};
use ethers::{
    types::{Address, Bytes, H256, U256, U64},
    utils::rlp::RlpStream,
};
use serde::{Deserialize, Serialize};

/// `v` offset of EIP-155 signatures, `v = recovery_id + 35 + 2 * chain_id`
const EIP155_V_OFFSET: u64 = 35;

/// `v` of signatures produced by signers following the pre-EIP-155 convention
const LEGACY_V_OFFSET: u8 = 27;

/// Canonical JSON of a transaction that still has to be signed
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnsignedTransaction {
    pub from: String,
    pub to: String,
    pub value: U256,
    pub data: Bytes,
    pub nonce: U64,
    pub gas_price: U256,
    pub gas: U256,
    pub chain_id: U64,
}

impl UnsignedTransaction {
    pub fn new(transfer: &Transfer, metadata: &ConstructionMetadata, chain_id: u64) -> Self {
        UnsignedTransaction {
            from: to_checksum(&transfer.sender),
            to: to_checksum(&transfer.receiver),
            value: transfer.amount,
            data: Bytes::default(),
            nonce: metadata.nonce,
            gas_price: metadata.gas_price,
            gas: metadata.gas_limit,
            chain_id: U64::from(chain_id),
        }
    }

    pub fn from_json(str: &str) -> ApiResult<Self> {
        let txn: UnsignedTransaction = serde_json::from_str(str)?;
        txn.sender()?;
        txn.receiver()?;
        Ok(txn)
    }

    pub fn to_json(&self) -> ApiResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn sender(&self) -> ApiResult<Address> {
        parse_address(&self.from)
    }

    pub fn receiver(&self) -> ApiResult<Address> {
        parse_address(&self.to)
    }

    /// EIP-155 hash the sender has to sign
    pub fn signing_hash(&self) -> ApiResult<[u8; 32]> {
        let mut stream = RlpStream::new_list(9);
        stream
            .append(&self.nonce)
            .append(&self.gas_price)
            .append(&self.gas)
            .append(&self.receiver()?)
            .append(&self.value)
            .append(&self.data.to_vec())
            .append(&self.chain_id)
            .append(&0u8)
            .append(&0u8);
        Ok(keccak256(&stream.out()))
    }

    /// Attaches a 65 byte `r || s || recovery_id` signature
    ///
    /// The recovery byte may be either 0/1 or 27/28.  The signature itself isn't verified.
    pub fn sign(&self, signature: &[u8]) -> ApiResult<SignedTransaction> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(ApiError::InvalidSignature(Some(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                signature.len()
            ))));
        }
        let recovery_id = normalize_recovery_id(signature[64])?;
        let v = U256::from(self.chain_id.as_u64())
            .checked_mul(U256::from(2))
            .and_then(|v| v.checked_add(U256::from(EIP155_V_OFFSET + recovery_id as u64)))
            .ok_or(ApiError::ChainIdMismatch)?;

        let mut txn = SignedTransaction {
            tx_type: U64::zero(),
            nonce: self.nonce,
            gas_price: self.gas_price,
            max_priority_fee_per_gas: None,
            max_fee_per_gas: None,
            gas: self.gas,
            value: self.value,
            input: self.data.clone(),
            v,
            r: U256::from_big_endian(&signature[..32]),
            s: U256::from_big_endian(&signature[32..64]),
            to: self.receiver()?,
            hash: None,
        };
        txn.hash = Some(txn.hash());
        Ok(txn)
    }
}

fn normalize_recovery_id(byte: u8) -> ApiResult<u8> {
    match byte {
        0 | 1 => Ok(byte),
        27 | 28 => Ok(byte - LEGACY_V_OFFSET),
        _ => Err(ApiError::InvalidSignature(Some(format!(
            "Invalid recovery id {}",
            byte
        )))),
    }
}

/// go-ethereum JSON of a signed legacy transaction
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    #[serde(rename = "type")]
    pub tx_type: U64,
    pub nonce: U64,
    pub gas_price: U256,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    pub gas: U256,
    pub value: U256,
    pub input: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
    pub to: Address,
    /// Carried for clients only, the hash is always recomputed from the fields
    #[serde(default)]
    pub hash: Option<H256>,
}

impl SignedTransaction {
    /// Decodes a signed transaction, only legacy transfers are supported
    pub fn from_json(str: &str) -> ApiResult<Self> {
        let txn: SignedTransaction = serde_json::from_str(str)?;
        if !txn.tx_type.is_zero()
            || txn.max_fee_per_gas.is_some()
            || txn.max_priority_fee_per_gas.is_some()
        {
            return Err(ApiError::DeserializationFailed(Some(format!(
                "Unsupported transaction type {}",
                txn.tx_type
            ))));
        }
        Ok(txn)
    }

    pub fn to_json(&self) -> ApiResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Raw bytes as accepted by `eth_sendRawTransaction`
    pub fn rlp_bytes(&self) -> Bytes {
        let mut stream = RlpStream::new_list(9);
        stream
            .append(&self.nonce)
            .append(&self.gas_price)
            .append(&self.gas)
            .append(&self.to)
            .append(&self.value)
            .append(&self.input.to_vec())
            .append(&self.v)
            .append(&self.r)
            .append(&self.s);
        stream.out().freeze().into()
    }

    /// Hash the node indexes the transaction under
    pub fn hash(&self) -> H256 {
        H256::from(keccak256(&self.rlp_bytes()))
    }

    fn v_offset(&self) -> Option<u64> {
        if self.v.bits() > 64 {
            return None;
        }
        self.v.low_u64().checked_sub(EIP155_V_OFFSET)
    }

    /// Chain id encoded in `v`, `None` for signatures without replay protection
    pub fn chain_id(&self) -> Option<u64> {
        self.v_offset().map(|offset| offset / 2)
    }

    pub fn recovery_id(&self) -> Option<u8> {
        self.v_offset().map(|offset| (offset % 2) as u8)
    }

    /// The unsigned form of this transaction, `from` being the recovered signer
    pub fn unsigned(&self) -> ApiResult<UnsignedTransaction> {
        let chain_id = self.chain_id().ok_or(ApiError::ChainIdMismatch)?;
        let mut unsigned = UnsignedTransaction {
            from: String::new(),
            to: to_checksum(&self.to),
            value: self.value,
            data: self.input.clone(),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas: self.gas,
            chain_id: U64::from(chain_id),
        };
        unsigned.from = to_checksum(&self.signer(&unsigned.signing_hash()?)?);
        Ok(unsigned)
    }

    fn signer(&self, signing_hash: &[u8; 32]) -> ApiResult<Address> {
        let recovery_id = self.recovery_id().ok_or(ApiError::ChainIdMismatch)?;
        let mut signature = [0u8; 64];
        self.r.to_big_endian(&mut signature[..32]);
        self.s.to_big_endian(&mut signature[32..]);
        recover_signer(signing_hash, &signature, recovery_id)
    }
}

/// Decodes the hex signature of a [`crate::types::Signature`]
pub fn decode_signature(hex_bytes: &str) -> ApiResult<Vec<u8>> {
    decode_hex(hex_bytes)
        .map_err(|_| ApiError::InvalidSignature(Some("Signature is not hex".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::native_coin;
    use claims::{assert_matches, assert_none, assert_some_eq};

    const SENDER: &str = "0x881d953652933937186BDf0680eD3c3c8a0162Ab";
    const RECEIVER: &str = "0x57B414a0332B5CaB885a451c2a28a07d1e9b8a8d";
    const TESTNET_CHAIN_ID: u64 = 0xfa2;
    const UNSIGNED: &str = r#"{"from":"0x881d953652933937186BDf0680eD3c3c8a0162Ab","to":"0x57B414a0332B5CaB885a451c2a28a07d1e9b8a8d","value":"0x9864aac3510d02","data":"0x","nonce":"0x0","gas_price":"0x3b9aca00","gas":"0x5208","chain_id":"0xfa2"}"#;
    const SIGNING_HASH: &str = "061454671a5cdcca4ce14bf4a0ae547f96b2eb822756251d07fa073c699c4524";
    const SIGNATURE: &str = "811EB6DB6485BADE9BF08BE96671BC0227ADD7451BC1F108DE790A58F676B45D45CED2D4C100CFD7AE0B33C1F59F43B05563912C8203E70AC8D428C86C21F77C01";
    const SIGNED: &str = r#"{"type":"0x0","nonce":"0x0","gasPrice":"0x3b9aca00","maxPriorityFeePerGas":null,"maxFeePerGas":null,"gas":"0x5208","value":"0x9864aac3510d02","input":"0x","v":"0x1f68","r":"0x811eb6db6485bade9bf08be96671bc0227add7451bc1f108de790a58f676b45d","s":"0x45ced2d4c100cfd7ae0b33c1f59f43b05563912c8203e70ac8d428c86c21f77c","to":"0x57b414a0332b5cab885a451c2a28a07d1e9b8a8d","hash":"0x58d9c340559b4ae3937a26a4def1d88b61c602ebbb8c430623d6df7f71e88f0d"}"#;
    const HASH: &str = "0x58d9c340559b4ae3937a26a4def1d88b61c602ebbb8c430623d6df7f71e88f0d";

    fn transfer() -> Transfer {
        Transfer {
            sender: parse_address(SENDER).unwrap(),
            receiver: parse_address(RECEIVER).unwrap(),
            amount: U256::from(42894881044106498u64),
            currency: native_coin(),
        }
    }

    fn metadata() -> ConstructionMetadata {
        ConstructionMetadata {
            nonce: U64::zero(),
            gas_price: U256::from(1_000_000_000u64),
            gas_limit: U256::from(21_000u64),
        }
    }

    #[test]
    fn test_unsigned_transaction() {
        let unsigned = UnsignedTransaction::new(&transfer(), &metadata(), TESTNET_CHAIN_ID);
        assert_eq!(unsigned.to_json().unwrap(), UNSIGNED);
        assert_eq!(UnsignedTransaction::from_json(UNSIGNED).unwrap(), unsigned);
        assert_eq!(hex::encode(unsigned.signing_hash().unwrap()), SIGNING_HASH);
    }

    #[test]
    fn test_sign() {
        let unsigned = UnsignedTransaction::from_json(UNSIGNED).unwrap();
        let signed = unsigned.sign(&hex::decode(SIGNATURE).unwrap()).unwrap();
        assert_eq!(signed.to_json().unwrap(), SIGNED);
        assert_eq!(format!("{:?}", signed.hash()), HASH);

        // A 27/28 recovery byte produces the same transaction
        let mut legacy = hex::decode(SIGNATURE).unwrap();
        legacy[64] += 27;
        assert_eq!(unsigned.sign(&legacy).unwrap(), signed);
    }

    #[test]
    fn test_sign_rejects_bad_signatures() {
        let unsigned = UnsignedTransaction::from_json(UNSIGNED).unwrap();
        let signature = hex::decode(SIGNATURE).unwrap();
        assert_matches!(
            unsigned.sign(&signature[..64]),
            Err(ApiError::InvalidSignature(_))
        );
        let mut bad_recovery = signature;
        bad_recovery[64] = 5;
        assert_matches!(
            unsigned.sign(&bad_recovery),
            Err(ApiError::InvalidSignature(_))
        );
    }

    #[test]
    fn test_signed_transaction() {
        let signed = SignedTransaction::from_json(SIGNED).unwrap();
        assert_some_eq!(signed.chain_id(), TESTNET_CHAIN_ID);
        assert_some_eq!(signed.recovery_id(), 1);
        assert_eq!(format!("{:?}", signed.hash()), HASH);

        let unsigned = signed.unsigned().unwrap();
        assert_eq!(unsigned.to_json().unwrap(), UNSIGNED);
    }

    #[test]
    fn test_hash_ignores_carried_hash() {
        let mut signed = SignedTransaction::from_json(SIGNED).unwrap();
        signed.hash = Some(H256::zero());
        assert_eq!(format!("{:?}", signed.hash()), HASH);

        let without_hash = SIGNED.replace(&format!(r#","hash":"{}""#, HASH), "");
        let signed = SignedTransaction::from_json(&without_hash).unwrap();
        assert_eq!(format!("{:?}", signed.hash()), HASH);
    }

    #[test]
    fn test_signed_transaction_without_replay_protection() {
        let mut signed = SignedTransaction::from_json(SIGNED).unwrap();
        signed.v = U256::from(28);
        assert_none!(signed.chain_id());
        assert_matches!(signed.unsigned(), Err(ApiError::ChainIdMismatch));
    }

    #[test]
    fn test_rejects_typed_transactions() {
        let dynamic_fee = SIGNED
            .replace(r#""type":"0x0""#, r#""type":"0x2""#)
            .replace(r#""maxFeePerGas":null"#, r#""maxFeePerGas":"0x1""#);
        assert_matches!(
            SignedTransaction::from_json(&dynamic_fee),
            Err(ApiError::DeserializationFailed(_))
        );
        assert_matches!(
            SignedTransaction::from_json("{}"),
            Err(ApiError::DeserializationFailed(_))
        );
        assert_matches!(
            UnsignedTransaction::from_json(&UNSIGNED.replace(RECEIVER, "0x1234")),
            Err(ApiError::InvalidAddress(_))
        );
    }
}
