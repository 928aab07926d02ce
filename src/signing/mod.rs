// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Signing
//!
//! - `transaction` - fee-payer transaction, signing hash and wire codec
//! - `pipeline` - resolves the tenant, signs, co-signs for the payer

pub mod pipeline;
pub mod transaction;

pub use pipeline::{sign_for_tenant, SignRequest, SignedTransaction, TxParams};
pub use transaction::{PayerTransaction, TxSignature};
