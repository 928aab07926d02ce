// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant Key Service - Multi-tenant Custodial HD Key Service
//!
//! Holds HD root wallets, derives one secp256k1 account per tenant on demand
//! and signs EVM transactions for it, optionally co-signed by a fee payer.
//! Admin traffic travels in signed, ECIES-encrypted envelopes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `audit` - Audit events on the `audit` tracing target
//! - `config` - Environment settings and the root/admin config file
//! - `crypto` - secp256k1 signatures and ECIES
//! - `keys` - Derivation paths, root wallets and the registry
//! - `keystore` - Master key loading
//! - `protocol` - Envelope handshake and secure requests
//! - `signing` - Fee-payer transactions and the signing pipeline
//! - `storage` - Key-value store and persistent schema

pub mod api;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod protocol;
pub mod signing;
pub mod state;
pub mod storage;
