// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Codec adapters applied at the serialization boundary.
//!
//! In-memory code keeps native types (`SigningKey`, `HashMap`); only these
//! helpers turn them into strings or ordered sequences for storage and files.

use std::collections::HashMap;

use alloy::rlp::{BufMut, Header};
use k256::ecdsa::SigningKey;

use super::{StorageError, StorageResult};

/// Encode a private key as `0x`-prefixed hex.
pub fn private_key_to_hex(key: &SigningKey) -> String {
    format!("0x{}", alloy::hex::encode(key.to_bytes()))
}

/// Parse a private key from hex, with or without a `0x` prefix.
pub fn private_key_from_hex(hex_key: &str) -> StorageResult<SigningKey> {
    let trimmed = hex_key.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = alloy::hex::decode(trimmed)
        .map_err(|e| StorageError::Codec(format!("invalid private key hex: {e}")))?;
    SigningKey::from_slice(&bytes)
        .map_err(|_| StorageError::Codec("invalid secp256k1 private key".to_string()))
}

/// Flatten a map keyed by tenant id into a sequence ordered by tenant id.
pub fn ordered_sequence<V>(map: &HashMap<u64, V>) -> Vec<(u64, &V)> {
    let mut entries: Vec<(u64, &V)> = map.iter().map(|(id, value)| (*id, value)).collect();
    entries.sort_unstable_by_key(|(id, _)| *id);
    entries
}

/// Wrap fields written by `fill` into an RLP list.
pub fn encode_rlp_list(fill: impl FnOnce(&mut dyn BufMut)) -> Vec<u8> {
    let mut payload: Vec<u8> = Vec::new();
    fill(&mut payload);

    let mut out: Vec<u8> = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

/// Strip the outer list header, returning the list payload.
pub fn rlp_list_payload<'a>(buf: &mut &'a [u8]) -> alloy::rlp::Result<&'a [u8]> {
    Header::decode_bytes(buf, true)
}

/// Fails if a decoder left list items unread.
pub fn finish_rlp_list(payload: &[u8]) -> alloy::rlp::Result<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(alloy::rlp::Error::Custom("unexpected trailing list items"))
    }
}
