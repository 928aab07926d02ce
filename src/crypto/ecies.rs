// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ECIES over secp256k1.
//!
//! Wire layout: `ephemeral_pub (65) || nonce (12) || ciphertext || tag (16)`.
//! The AES-256-GCM key is HKDF-SHA256 over the ECDH shared secret, salted
//! with the ephemeral public key, which is also bound as associated data.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use k256::ecdh::{diffie_hellman, SharedSecret};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use sha2::Sha256;

use super::signature::{public_key_bytes, PUBLIC_KEY_LENGTH};
use super::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KDF_INFO: &[u8] = b"tenant-keyservice/ecies/aes-256-gcm";

/// Smallest possible ciphertext (empty plaintext).
pub const OVERHEAD: usize = PUBLIC_KEY_LENGTH + NONCE_LEN + TAG_LEN;

fn derive_key(shared: &SharedSecret, ephemeral_pub: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    shared
        .extract::<Sha256>(Some(ephemeral_pub))
        .expand(KDF_INFO, &mut key)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok(key)
}

/// Encrypt `plaintext` to the holder of `recipient`'s private key.
pub fn encrypt(recipient: &VerifyingKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = SigningKey::random(&mut OsRng);
    let ephemeral_pub = public_key_bytes(ephemeral.verifying_key());
    let shared = diffie_hellman(ephemeral.as_nonzero_scalar(), recipient.as_affine());
    let key = derive_key(&shared, &ephemeral_pub)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Encrypt)?;
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &ephemeral_pub,
            },
        )
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_LENGTH + NONCE_LEN + sealed.len());
    out.extend_from_slice(&ephemeral_pub);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt an ECIES message. Every failure is reported as `Decrypt`.
pub fn decrypt(recipient: &SigningKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < OVERHEAD {
        return Err(CryptoError::Decrypt);
    }
    let (ephemeral_pub, rest) = ciphertext.split_at(PUBLIC_KEY_LENGTH);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

    let ephemeral = VerifyingKey::from_sec1_bytes(ephemeral_pub).map_err(|_| CryptoError::Decrypt)?;
    let shared = diffie_hellman(recipient.as_nonzero_scalar(), ephemeral.as_affine());
    let key = derive_key(&shared, ephemeral_pub).map_err(|_| CryptoError::Decrypt)?;

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Decrypt)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: sealed,
                aad: ephemeral_pub,
            },
        )
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let recipient = SigningKey::random(&mut OsRng);
        let sealed = encrypt(recipient.verifying_key(), b"register tenant 42").unwrap();
        assert_eq!(sealed.len(), OVERHEAD + 18);
        let opened = decrypt(&recipient, &sealed).unwrap();
        assert_eq!(opened, b"register tenant 42");
    }

    #[test]
    fn encryption_is_randomized() {
        let recipient = SigningKey::random(&mut OsRng);
        let a = encrypt(recipient.verifying_key(), b"same").unwrap();
        let b = encrypt(recipient.verifying_key(), b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_recipient_fails() {
        let recipient = SigningKey::random(&mut OsRng);
        let other = SigningKey::random(&mut OsRng);
        let sealed = encrypt(recipient.verifying_key(), b"secret").unwrap();
        assert!(matches!(decrypt(&other, &sealed), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn any_flipped_byte_fails() {
        let recipient = SigningKey::random(&mut OsRng);
        let sealed = encrypt(recipient.verifying_key(), b"tamper me").unwrap();
        for index in [0, 1, PUBLIC_KEY_LENGTH, PUBLIC_KEY_LENGTH + NONCE_LEN, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            assert!(decrypt(&recipient, &tampered).is_err(), "byte {index}");
        }
    }

    #[test]
    fn truncated_input_fails() {
        let recipient = SigningKey::random(&mut OsRng);
        assert!(decrypt(&recipient, &[0u8; OVERHEAD - 1]).is_err());
    }
}
