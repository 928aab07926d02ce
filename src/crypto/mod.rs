// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptographic Primitives
//!
//! secp256k1 building blocks shared by the envelope protocol and the
//! transaction pipeline:
//!
//! - `signature` - recoverable ECDSA over 32-byte prehashes, address derivation
//! - `ecies` - ephemeral ECDH + HKDF-SHA256 + AES-256-GCM public-key encryption

pub mod ecies;
pub mod signature;

pub use signature::{
    parse_public_key, pubkey_to_address, public_key_bytes, recover_address, recover_public_key,
    sign_hash, SIGNATURE_LENGTH,
};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signing failed")]
    Signing,

    #[error("chain id {0} is out of range")]
    InvalidChainId(u64),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,
}
