// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Tenant Keys
//!
//! - `path` - tenant id → HD derivation path
//! - `wallet` - root wallets and their derived tenant accounts
//! - `registry` - process-wide owner of every root wallet

pub mod path;
pub mod registry;
pub mod wallet;

pub use path::{derive_path, parse_tenant_id, HdPath, PARTITION_THRESHOLD};
pub use registry::{Registry, RootInfo, ShutdownReport};
pub use wallet::{AccountInfo, ChildAccount, MasterKey, RootWallet};
