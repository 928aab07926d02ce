// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Legacy-style transaction extended with an optional fee payer.
//!
//! Wire layout (RLP list):
//!
//! ```text
//! [nonce, gas_price, gas, to, value, input, payer, fee, v, r, s, pv, pr, ps]
//! ```
//!
//! `to` and `payer` are empty strings when absent. Both signatures cover the
//! same EIP-155 style hash:
//! `keccak256(rlp([nonce, gas_price, gas, to, value, input, payer, fee, chain_id, 0, 0]))`.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rlp::{BufMut, Decodable, Encodable, EMPTY_STRING_CODE};
use k256::ecdsa::SigningKey;

use crate::crypto::{recover_address, sign_hash, CryptoError, SIGNATURE_LENGTH};
use crate::storage::codec::{encode_rlp_list, finish_rlp_list, rlp_list_payload};

/// EIP-155 `v` offset.
const CHAIN_ID_OFFSET: u64 = 35;

/// Largest chain id whose EIP-155 `v` still fits in a `u64`.
pub const MAX_CHAIN_ID: u64 = (u64::MAX - CHAIN_ID_OFFSET - 1) / 2;

/// One `(v, r, s)` triple with an EIP-155 `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl TxSignature {
    fn from_raw(raw: &[u8; SIGNATURE_LENGTH], chain_id: u64) -> Result<Self, CryptoError> {
        let v = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(CHAIN_ID_OFFSET))
            .and_then(|v| v.checked_add(u64::from(raw[64])))
            .ok_or(CryptoError::InvalidChainId(chain_id))?;
        Ok(Self {
            v,
            r: U256::from_be_slice(&raw[..32]),
            s: U256::from_be_slice(&raw[32..64]),
        })
    }

    /// Chain id folded into `v`; `None` for a pre-EIP-155 `v`.
    pub fn chain_id(&self) -> Option<u64> {
        self.v
            .checked_sub(CHAIN_ID_OFFSET)
            .map(|offset| offset / 2)
    }

    fn to_raw(self) -> Option<[u8; SIGNATURE_LENGTH]> {
        let recovery = self.v.checked_sub(CHAIN_ID_OFFSET)? % 2;
        let mut raw = [0u8; SIGNATURE_LENGTH];
        raw[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        raw[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        raw[64] = recovery as u8;
        Some(raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayerTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub payer: Option<Address>,
    /// Zero when no fee is charged.
    pub fee: U256,
    pub signature: Option<TxSignature>,
    pub payer_signature: Option<TxSignature>,
}

pub(crate) fn encode_optional_address(address: &Option<Address>, out: &mut dyn BufMut) {
    match address {
        Some(address) => address.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

pub(crate) fn decode_optional_address(buf: &mut &[u8]) -> alloy::rlp::Result<Option<Address>> {
    match buf.first() {
        Some(&EMPTY_STRING_CODE) => {
            *buf = &buf[1..];
            Ok(None)
        }
        _ => Address::decode(buf).map(Some),
    }
}

fn encode_signature(signature: &Option<TxSignature>, out: &mut dyn BufMut) {
    let sig = signature.unwrap_or(TxSignature {
        v: 0,
        r: U256::ZERO,
        s: U256::ZERO,
    });
    sig.v.encode(out);
    sig.r.encode(out);
    sig.s.encode(out);
}

fn decode_signature(buf: &mut &[u8]) -> alloy::rlp::Result<Option<TxSignature>> {
    let sig = TxSignature {
        v: u64::decode(buf)?,
        r: U256::decode(buf)?,
        s: U256::decode(buf)?,
    };
    Ok((sig.v != 0 || !sig.r.is_zero() || !sig.s.is_zero()).then_some(sig))
}

impl PayerTransaction {
    fn encode_body(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_optional_address(&self.to, out);
        self.value.encode(out);
        self.input.encode(out);
        encode_optional_address(&self.payer, out);
        self.fee.encode(out);
    }

    /// Hash both the sender and the fee payer sign.
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        keccak256(encode_rlp_list(|out| {
            self.encode_body(out);
            chain_id.encode(out);
            0u8.encode(out);
            0u8.encode(out);
        }))
    }

    /// `value + gas_price * gas_limit + fee`, saturating at `U256::MAX`.
    pub fn cost(&self) -> U256 {
        self.gas_price
            .saturating_mul(U256::from(self.gas_limit))
            .saturating_add(self.value)
            .saturating_add(self.fee)
    }

    pub fn sign(&mut self, key: &SigningKey, chain_id: u64) -> Result<(), CryptoError> {
        let raw = sign_hash(key, &self.signing_hash(chain_id))?;
        self.signature = Some(TxSignature::from_raw(&raw, chain_id)?);
        Ok(())
    }

    pub fn sign_as_payer(&mut self, key: &SigningKey, chain_id: u64) -> Result<(), CryptoError> {
        let raw = sign_hash(key, &self.signing_hash(chain_id))?;
        self.payer_signature = Some(TxSignature::from_raw(&raw, chain_id)?);
        Ok(())
    }

    fn recover(&self, signature: Option<TxSignature>) -> Result<Address, CryptoError> {
        let signature = signature.ok_or(CryptoError::InvalidSignature)?;
        let chain_id = signature.chain_id().ok_or(CryptoError::InvalidSignature)?;
        let raw = signature.to_raw().ok_or(CryptoError::InvalidSignature)?;
        recover_address(&self.signing_hash(chain_id), &raw)
    }

    pub fn recover_sender(&self) -> Result<Address, CryptoError> {
        self.recover(self.signature)
    }

    pub fn recover_payer(&self) -> Result<Address, CryptoError> {
        self.recover(self.payer_signature)
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_rlp_list(|out| {
            self.encode_body(out);
            encode_signature(&self.signature, out);
            encode_signature(&self.payer_signature, out);
        })
    }

    /// Transaction hash: keccak of the signed wire encoding.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    pub fn decode(bytes: &[u8]) -> alloy::rlp::Result<Self> {
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf)?;
        if !buf.is_empty() {
            return Err(alloy::rlp::Error::Custom("trailing bytes after transaction"));
        }
        let tx = Self {
            nonce: u64::decode(&mut payload)?,
            gas_price: U256::decode(&mut payload)?,
            gas_limit: u64::decode(&mut payload)?,
            to: decode_optional_address(&mut payload)?,
            value: U256::decode(&mut payload)?,
            input: Bytes::decode(&mut payload)?,
            payer: decode_optional_address(&mut payload)?,
            fee: U256::decode(&mut payload)?,
            signature: decode_signature(&mut payload)?,
            payer_signature: decode_signature(&mut payload)?,
        };
        finish_rlp_list(payload)?;
        Ok(tx)
    }
}
