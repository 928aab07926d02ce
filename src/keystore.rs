// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Master Key Loading
//!
//! The registry is bootstrapped from decrypted master keys. `PemKeystore`
//! reads them from disk in two formats:
//!
//! - PEM: SEC1 (`EC PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) secp256k1 keys
//! - JSON: `{ "address": "0x…", "private_key": "0x…" }`; the address must
//!   match the key
//!
//! Password-protected keyfiles are decrypted upstream of this module.

use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use k256::ecdsa::SigningKey;
use k256::SecretKey;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::keys::MasterKey;
use crate::storage::codec::{private_key_from_hex, private_key_to_hex};

#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM in {0}: {1}")]
    InvalidPem(PathBuf, String),

    #[error("invalid key file {0}: {1}")]
    InvalidKeyFile(PathBuf, String),

    #[error("key file {path} declares {declared} but holds the key of {actual}")]
    AddressMismatch {
        path: PathBuf,
        declared: Address,
        actual: Address,
    },

    #[error("unsupported key file {0}")]
    Unsupported(PathBuf),
}

pub type KeystoreResult<T> = Result<T, KeystoreError>;

/// Source of decrypted master keys.
pub trait Keystore {
    fn load(&self, path: &Path) -> KeystoreResult<MasterKey>;
}

/// JSON keyfile body.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonKeyFile {
    pub address: Address,
    pub private_key: String,
}

impl JsonKeyFile {
    pub fn from_key(key: &MasterKey) -> Self {
        Self {
            address: key.address(),
            private_key: private_key_to_hex(key.signing_key()),
        }
    }
}

/// Parse a secp256k1 private key from PEM, SEC1 first, then PKCS#8.
pub fn signing_key_from_pem(pem_bytes: &[u8]) -> Result<SigningKey, String> {
    let pem_str = std::str::from_utf8(pem_bytes).map_err(|e| format!("invalid UTF-8: {e}"))?;
    let pem = pem::parse(pem_str).map_err(|e| format!("invalid PEM: {e}"))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| {
            use k256::pkcs8::DecodePrivateKey;
            SecretKey::from_pkcs8_der(pem.contents()).map_err(|e| e.to_string())
        })
        .map_err(|e| format!("invalid key format: {e}"))?;

    Ok(SigningKey::from(secret_key))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PemKeystore;

impl PemKeystore {
    fn read(path: &Path) -> KeystoreResult<Vec<u8>> {
        fs::read(path).map_err(|source| KeystoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_json(path: &Path, bytes: &[u8]) -> KeystoreResult<MasterKey> {
        let file: JsonKeyFile = serde_json::from_slice(bytes)
            .map_err(|e| KeystoreError::InvalidKeyFile(path.to_path_buf(), e.to_string()))?;
        let key = private_key_from_hex(&file.private_key)
            .map_err(|e| KeystoreError::InvalidKeyFile(path.to_path_buf(), e.to_string()))?;

        let master = MasterKey::new(key);
        if master.address() != file.address {
            return Err(KeystoreError::AddressMismatch {
                path: path.to_path_buf(),
                declared: file.address,
                actual: master.address(),
            });
        }
        Ok(master)
    }

    /// Load every `.pem` and `.json` key in a directory, in file name order.
    /// Files with other extensions are skipped.
    pub fn load_dir(&self, dir: &Path) -> KeystoreResult<Vec<MasterKey>> {
        let entries = fs::read_dir(dir).map_err(|source| KeystoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut keys = Vec::new();
        for path in paths {
            match self.load(&path) {
                Ok(key) => {
                    info!(address = %key.address(), file = %path.display(), "Master key loaded");
                    keys.push(key);
                }
                Err(KeystoreError::Unsupported(path)) => {
                    warn!(file = %path.display(), "Skipping unrecognised file in keystore");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(keys)
    }

    /// Write a JSON keyfile. Used by provisioning tools and tests.
    pub fn write_json(&self, path: &Path, key: &MasterKey) -> KeystoreResult<()> {
        let body = serde_json::to_vec_pretty(&JsonKeyFile::from_key(key))
            .map_err(|e| KeystoreError::InvalidKeyFile(path.to_path_buf(), e.to_string()))?;
        fs::write(path, body).map_err(|source| KeystoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Keystore for PemKeystore {
    fn load(&self, path: &Path) -> KeystoreResult<MasterKey> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pem") => {
                let bytes = Self::read(path)?;
                let key = signing_key_from_pem(&bytes)
                    .map_err(|e| KeystoreError::InvalidPem(path.to_path_buf(), e))?;
                Ok(MasterKey::new(key))
            }
            Some("json") => {
                let bytes = Self::read(path)?;
                Self::load_json(path, &bytes)
            }
            _ => Err(KeystoreError::Unsupported(path.to_path_buf())),
        }
    }
}
