// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recoverable secp256k1 signatures in the 65-byte `r || s || v` layout.

use alloy::primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use super::CryptoError;

/// Length of a recoverable signature (`r || s || v`).
pub const SIGNATURE_LENGTH: usize = 65;

/// Length of an uncompressed SEC1 public key.
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Derive the EVM address of a public key: `keccak256(pub[1..])[12..]`.
pub fn pubkey_to_address(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Uncompressed SEC1 encoding of a public key.
pub fn public_key_bytes(key: &VerifyingKey) -> [u8; PUBLIC_KEY_LENGTH] {
    let encoded = key.to_encoded_point(false);
    let mut out = [0u8; PUBLIC_KEY_LENGTH];
    out.copy_from_slice(encoded.as_bytes());
    out
}

pub fn parse_public_key(bytes: &[u8]) -> Result<VerifyingKey, CryptoError> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Sign a 32-byte prehash. The recovery byte is 0 or 1.
pub fn sign_hash(key: &SigningKey, hash: &B256) -> Result<[u8; SIGNATURE_LENGTH], CryptoError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(hash.as_slice())
        .map_err(|_| CryptoError::Signing)?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// Recover the signer's public key. Accepts `v` as 0/1 or 27/28.
pub fn recover_public_key(hash: &B256, signature: &[u8]) -> Result<VerifyingKey, CryptoError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidSignature);
    }
    let v = match signature[64] {
        v @ (27 | 28) => v - 27,
        v => v,
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or(CryptoError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&signature[..64]).map_err(|_| CryptoError::InvalidSignature)?;

    VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)
}

pub fn recover_address(hash: &B256, signature: &[u8]) -> Result<Address, CryptoError> {
    recover_public_key(hash, signature).map(|key| pubkey_to_address(&key))
}
