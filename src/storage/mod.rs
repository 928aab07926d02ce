// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage
//!
//! The registry persists only what it needs to rehydrate after a restart:
//! which tenants exist under each root, and a public record per tenant.
//! Private keys are never written; they are re-derived from the root seed.
//!
//! ## Layers
//!
//! - `kv` - the `KvStore` contract with redb and in-memory implementations
//! - `schema` - prefixed key layout and typed accessors
//! - `codec` - boundary adapters (hex keys, ordered sequences, RLP lists)

pub mod codec;
pub mod kv;
pub mod schema;

pub use kv::{KvStore, MemoryStore, RedbStore, StorageError, StorageResult};
pub use schema::{AccountLookup, Schema, TenantRecord};
