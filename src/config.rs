// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Process settings come from the environment; the root/admin trust list
//! comes from a JSON config file.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KEYSERVICE_DATA_DIR` | Directory holding the redb database | `./keydata` |
//! | `KEYSERVICE_CONFIG` | Root/admin JSON config | `<data dir>/config.json` |
//! | `KEYSERVICE_KEYSTORE_DIR` | Directory of master key files | Optional |
//! | `KEYSERVICE_KEYSTORE` | Single master key file | Optional |
//! | `KEYSERVICE_ENVELOPE_MAX_AGE_SECS` | Envelope max age, `0` disables | `300` |
//! | `KEYSERVICE_PLAIN_ROUTES` | Serve unauthenticated `/v1/tenants` and `/v1/sign` | `false` |
//! | `HOST` | Server bind address | `rpcaddr` or `0.0.0.0` |
//! | `PORT` | Server bind port | `rpcport` or `8550` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! ## Config File
//!
//! ```json
//! {
//!     "rpcaddr": "127.0.0.1",
//!     "rpcport": 8550,
//!     "admins": [{ "root": "0x…", "admins": ["0x…"] }],
//!     "default_root": "0x…"
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

pub const DATA_DIR_ENV: &str = "KEYSERVICE_DATA_DIR";
pub const CONFIG_ENV: &str = "KEYSERVICE_CONFIG";
pub const KEYSTORE_DIR_ENV: &str = "KEYSERVICE_KEYSTORE_DIR";
pub const KEYSTORE_FILE_ENV: &str = "KEYSERVICE_KEYSTORE";
pub const ENVELOPE_MAX_AGE_ENV: &str = "KEYSERVICE_ENVELOPE_MAX_AGE_SECS";
pub const PLAIN_ROUTES_ENV: &str = "KEYSERVICE_PLAIN_ROUTES";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "keydata";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8550;
pub const DEFAULT_ENVELOPE_MAX_AGE_SECS: u64 = 300;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Database file inside the data directory.
pub const DATABASE_FILE: &str = "keyservice.redb";
/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Trusted admins of one root wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub root: Address,
    #[serde(default)]
    pub admins: Vec<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpcaddr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpcport: Option<u16>,
    #[serde(default)]
    pub admins: Vec<RootConfig>,
    /// Root used by the plain (non-envelope) routes when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_root: Option<Address>,
}

impl ServiceConfig {
    /// Load the config; a missing file yields the empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file, starting without admins");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fold admin lists of repeated roots into one entry each, keeping first
    /// appearance order for roots and address order for admins.
    pub fn merge_admins(entries: impl IntoIterator<Item = RootConfig>) -> Vec<RootConfig> {
        let mut merged: Vec<(Address, BTreeSet<Address>)> = Vec::new();
        for entry in entries {
            match merged.iter_mut().find(|(root, _)| *root == entry.root) {
                Some((_, admins)) => admins.extend(entry.admins),
                None => merged.push((entry.root, entry.admins.into_iter().collect())),
            }
        }
        merged
            .into_iter()
            .map(|(root, admins)| RootConfig {
                root,
                admins: admins.into_iter().collect(),
            })
            .collect()
    }

    /// Write `self` to `path`, keeping admins already listed there for the
    /// same roots.
    pub fn write_merged(&self, path: &Path) -> Result<(), ConfigError> {
        let existing = Self::load(path)?;
        let known: BTreeSet<Address> = self.admins.iter().map(|entry| entry.root).collect();

        let mut out = self.clone();
        out.admins = Self::merge_admins(
            self.admins.iter().cloned().chain(
                existing
                    .admins
                    .into_iter()
                    .filter(|entry| known.contains(&entry.root)),
            ),
        );

        let mut body = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
        out.serialize(&mut serializer)
            .map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        fs::write(path, body).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Process settings resolved from the environment and config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub keystore_dir: Option<PathBuf>,
    pub keystore_file: Option<PathBuf>,
    pub envelope_max_age_secs: u64,
    /// Expose the plain routes. Off unless explicitly enabled.
    pub plain_routes: bool,
    pub host: String,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`, which returns variable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(
            lookup(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );
        let config_path = lookup(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE));

        let envelope_max_age_secs = match lookup(ENVELOPE_MAX_AGE_ENV) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENVELOPE_MAX_AGE_ENV,
                value,
            })?,
            None => DEFAULT_ENVELOPE_MAX_AGE_SECS,
        };

        let plain_routes = match lookup(PLAIN_ROUTES_ENV) {
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "" | "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: PLAIN_ROUTES_ENV,
                        value,
                    })
                }
            },
            None => false,
        };

        let port = match lookup(PORT_ENV) {
            Some(value) => Some(value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: PORT_ENV,
                value,
            })?),
            None => None,
        };

        Ok(Self {
            data_dir,
            config_path,
            keystore_dir: lookup(KEYSTORE_DIR_ENV).map(PathBuf::from),
            keystore_file: lookup(KEYSTORE_FILE_ENV).map(PathBuf::from),
            envelope_max_age_secs,
            plain_routes,
            host: lookup(HOST_ENV).unwrap_or_default(),
            port: port.unwrap_or_default(),
        })
    }

    /// Fill bind address gaps from the config file, then from defaults.
    pub fn with_config(mut self, config: &ServiceConfig) -> Self {
        if self.host.is_empty() {
            self.host = config
                .rpcaddr
                .clone()
                .unwrap_or_else(|| DEFAULT_HOST.to_string());
        }
        if self.port == 0 {
            self.port = config.rpcport.unwrap_or(DEFAULT_PORT);
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}
