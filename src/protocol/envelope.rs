// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed, encrypted message envelopes.
//!
//! An envelope carries an ECIES ciphertext addressed to the recipient plus a
//! recoverable signature by the sender over `keccak256(rlp([created_at, payload]))`.
//! Envelopes are never stored; each lives for one request/response exchange.

use std::time::Duration;

use alloy::primitives::{keccak256, Bytes, B256};
use alloy::rlp::Encodable;
use k256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::crypto::{ecies, recover_public_key, sign_hash};
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::storage::codec::encode_rlp_list;

/// Default maximum envelope age.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Tolerated clock skew for envelopes stamped in the future.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(30);

/// Wire shape: `{createdAt, payload, signature}`, bytes hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unix seconds at which the sender sealed the envelope.
    pub created_at: u64,
    /// ECIES ciphertext, `0x`-hex.
    #[schema(value_type = String)]
    pub payload: Bytes,
    /// 65-byte recoverable signature, `0x`-hex.
    #[schema(value_type = String)]
    pub signature: Bytes,
}

/// Hash covered by an envelope signature.
pub fn envelope_hash(created_at: u64, payload: &[u8]) -> B256 {
    let encoded = encode_rlp_list(|out| {
        created_at.encode(out);
        payload.encode(out);
    });
    keccak256(encoded)
}

impl Envelope {
    /// Encrypt `plaintext` to `recipient` and sign it with `sender`.
    pub fn seal(
        sender: &SigningKey,
        recipient: &VerifyingKey,
        plaintext: &[u8],
        created_at: u64,
    ) -> KeyServiceResult<Self> {
        let payload = ecies::encrypt(recipient, plaintext)?;
        let signature = sign_hash(sender, &envelope_hash(created_at, &payload))?;
        Ok(Self {
            created_at,
            payload: payload.into(),
            signature: Bytes::copy_from_slice(&signature),
        })
    }

    pub fn hash(&self) -> B256 {
        envelope_hash(self.created_at, &self.payload)
    }

    /// Recover the public key that signed this envelope.
    pub fn recover_sender(&self) -> KeyServiceResult<VerifyingKey> {
        recover_public_key(&self.hash(), &self.signature).map_err(|_| KeyServiceError::BadSignature)
    }

    pub fn verify(&self, sender: &VerifyingKey) -> KeyServiceResult<()> {
        if self.recover_sender()? != *sender {
            return Err(KeyServiceError::BadSignature);
        }
        Ok(())
    }

    /// Verify the signature against `sender`, then decrypt with `recipient`.
    pub fn open(&self, recipient: &SigningKey, sender: &VerifyingKey) -> KeyServiceResult<Vec<u8>> {
        self.verify(sender)?;
        Ok(ecies::decrypt(recipient, &self.payload)?)
    }
}

/// Freshness rule applied to inbound envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopePolicy {
    max_age: Option<Duration>,
    max_skew: Duration,
}

impl Default for EnvelopePolicy {
    fn default() -> Self {
        Self {
            max_age: Some(DEFAULT_MAX_AGE),
            max_skew: DEFAULT_MAX_SKEW,
        }
    }
}

impl EnvelopePolicy {
    /// `0` disables the age check.
    pub fn from_max_age_secs(secs: u64) -> Self {
        Self {
            max_age: (secs > 0).then(|| Duration::from_secs(secs)),
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_age: None,
            ..Self::default()
        }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn check(&self, created_at: u64, now: u64) -> KeyServiceResult<()> {
        let Some(max_age) = self.max_age else {
            return Ok(());
        };
        if created_at > now.saturating_add(self.max_skew.as_secs()) {
            return Err(KeyServiceError::StaleEnvelope);
        }
        if now.saturating_sub(created_at) > max_age.as_secs() {
            return Err(KeyServiceError::StaleEnvelope);
        }
        Ok(())
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
