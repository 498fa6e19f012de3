// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Account derivation and signer recovery for secp256k1 keys
//!
//! An Opera account address is the last 20 bytes of the keccak-256 hash of the uncompressed
//! public key (without the `0x04` tag), formatted with EIP-55 checksum casing.

use crate::{
    common::decode_hex,
    error::{ApiError, ApiResult},
    types::{CurveType, PublicKey},
};
use ethers::types::Address;
use tiny_keccak::{Hasher, Keccak};

pub const SIGNATURE_LENGTH: usize = 65;

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}

pub fn public_key_address(public_key: &libsecp256k1::PublicKey) -> Address {
    let public_key = public_key.serialize();
    debug_assert_eq!(public_key[0], 0x04);
    let hash = keccak256(&public_key[1..]);

    Address::from_slice(&hash[12..])
}

/// EIP-55 mixed case encoding of an address
pub fn to_checksum(address: &Address) -> String {
    ethers::utils::to_checksum(address, None)
}

/// Derives the account of a Rosetta public key, only secp256k1 keys are accepted
pub fn derive_address(public_key: &PublicKey) -> ApiResult<Address> {
    if public_key.curve_type != CurveType::Secp256k1 {
        return Err(ApiError::UnsupportedCurveType(Some(format!(
            "{:?} is not supported",
            public_key.curve_type
        ))));
    }

    let bytes = decode_hex(&public_key.hex_bytes)?;
    let public_key = libsecp256k1::PublicKey::parse_slice(&bytes, None).map_err(|err| {
        ApiError::InvalidInput(Some(format!("Invalid secp256k1 public key: {:?}", err)))
    })?;
    Ok(public_key_address(&public_key))
}

/// Recovers the account that produced a signature over `hash`
///
/// `recovery_id` must already be normalized to 0 or 1.
pub fn recover_signer(
    hash: &[u8; 32],
    signature: &[u8; 64],
    recovery_id: u8,
) -> ApiResult<Address> {
    let message = libsecp256k1::Message::parse(hash);
    let signature = libsecp256k1::Signature::parse_standard(signature)
        .map_err(|err| ApiError::InvalidSignature(Some(format!("{:?}", err))))?;
    let recovery_id = libsecp256k1::RecoveryId::parse(recovery_id)
        .map_err(|err| ApiError::InvalidSignature(Some(format!("{:?}", err))))?;
    let public_key = libsecp256k1::recover(&message, &signature, &recovery_id)
        .map_err(|err| ApiError::InvalidSignature(Some(format!("{:?}", err))))?;
    Ok(public_key_address(&public_key))
}
