// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant id → BIP-32 derivation path allocation.
//!
//! Every tenant lives at `m/44'/60'/{namespace}'/0/{account}`. Ids up to
//! [`PARTITION_THRESHOLD`] share namespace 0 and use the id as the account
//! index. Larger ids are split in decimal: the leading six digits become the
//! namespace, the remaining digits the account index.

use std::fmt;

use bip32::{ChildNumber, DerivationPath};

use crate::error::{KeyServiceError, KeyServiceResult};

/// Largest tenant id that maps directly onto an account index.
pub const PARTITION_THRESHOLD: u64 = 4_294_967_290;

const NAMESPACE_DIGITS: usize = 6;
const PURPOSE: u32 = 44;
const COIN_TYPE: u32 = 60;
const CHANGE: u32 = 0;

/// A tenant's position in the HD tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdPath {
    namespace: u32,
    account: u32,
}

impl HdPath {
    pub fn new(namespace: u32, account: u32) -> Self {
        Self { namespace, account }
    }

    pub fn namespace(&self) -> u32 {
        self.namespace
    }

    pub fn account(&self) -> u32 {
        self.account
    }

    /// Full BIP-32 path.
    ///
    /// The account index is used as a raw child number, so indices at or
    /// above 2^31 land in the hardened range.
    pub fn to_derivation_path(&self) -> KeyServiceResult<DerivationPath> {
        let hardened = |index: u32| {
            ChildNumber::new(index, true)
                .map_err(|e| KeyServiceError::DerivationFailed(format!("index {index}: {e}")))
        };

        let mut path = DerivationPath::default();
        path.push(hardened(PURPOSE)?);
        path.push(hardened(COIN_TYPE)?);
        path.push(hardened(self.namespace)?);
        path.push(ChildNumber(CHANGE));
        path.push(ChildNumber(self.account));
        Ok(path)
    }
}

impl fmt::Display for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{PURPOSE}'/{COIN_TYPE}'/{}'/{CHANGE}/{}",
            self.namespace, self.account
        )
    }
}

/// Decimal split used above the threshold: (namespace digits, account digits).
fn split_digits(digits: &str) -> Option<(&str, &str)> {
    if digits.len() <= NAMESPACE_DIGITS {
        return None;
    }
    Some(digits.split_at(NAMESPACE_DIGITS))
}

/// Allocate the derivation path for a tenant. Pure and deterministic.
pub fn derive_path(tenant_id: u64) -> KeyServiceResult<HdPath> {
    if tenant_id <= PARTITION_THRESHOLD {
        let account = u32::try_from(tenant_id).map_err(|_| {
            KeyServiceError::DerivationFailed(format!("account index {tenant_id} exceeds 32 bits"))
        })?;
        return Ok(HdPath::new(0, account));
    }

    let digits = tenant_id.to_string();
    let (namespace_digits, account_digits) = split_digits(&digits)
        .ok_or_else(|| KeyServiceError::InvalidIdentifier(digits.clone()))?;

    let namespace: u32 = namespace_digits
        .parse()
        .map_err(|_| KeyServiceError::InvalidIdentifier(digits.clone()))?;
    let account: u64 = account_digits
        .parse()
        .map_err(|_| KeyServiceError::InvalidIdentifier(digits.clone()))?;
    let account = u32::try_from(account).map_err(|_| {
        KeyServiceError::DerivationFailed(format!(
            "account index {account} of tenant {tenant_id} exceeds 32 bits"
        ))
    })?;

    Ok(HdPath::new(namespace, account))
}

/// Parse a tenant identifier supplied as decimal text.
pub fn parse_tenant_id(raw: &str) -> KeyServiceResult<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyServiceError::InvalidIdentifier(raw.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| KeyServiceError::InvalidIdentifier(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ids_share_namespace_zero() {
        let path = derive_path(42).unwrap();
        assert_eq!(path.namespace(), 0);
        assert_eq!(path.account(), 42);
        assert_eq!(path.to_string(), "m/44'/60'/0'/0/42");
    }

    #[test]
    fn large_ids_are_partitioned() {
        assert_eq!(split_digits("18682003824"), Some(("186820", "03824")));

        let path = derive_path(18682003824).unwrap();
        assert_eq!(path.namespace(), 186820);
        assert_eq!(path.account(), 3824);
        assert_eq!(path.to_string(), "m/44'/60'/186820'/0/3824");
    }

    #[test]
    fn threshold_boundary() {
        let at = derive_path(PARTITION_THRESHOLD).unwrap();
        assert_eq!(at.namespace(), 0);
        assert_eq!(at.account(), 4_294_967_290);

        let above = derive_path(PARTITION_THRESHOLD + 1).unwrap();
        assert_eq!(above.namespace(), 429496);
        assert_eq!(above.account(), 7291);
    }

    #[test]
    fn oversized_account_index_fails_derivation() {
        // 18446744073709551615 → namespace 184467, account 44073709551615
        assert!(matches!(
            derive_path(u64::MAX),
            Err(KeyServiceError::DerivationFailed(_))
        ));
    }

    #[test]
    fn derivation_is_deterministic() {
        for id in [0, 1, 42, 13800138000, 18682003824] {
            assert_eq!(derive_path(id).unwrap(), derive_path(id).unwrap());
        }
    }

    #[test]
    fn bip32_path_components() {
        let path = derive_path(18682003824)
            .unwrap()
            .to_derivation_path()
            .unwrap();
        let children: Vec<ChildNumber> = path.iter().collect();
        assert_eq!(children.len(), 5);
        assert!(children[2].is_hardened());
        assert_eq!(children[2].index(), 186820);
        assert!(!children[3].is_hardened());
        assert_eq!(children[4], ChildNumber(3824));
        assert_eq!(path.to_string(), "m/44'/60'/186820'/0/3824");
    }

    #[test]
    fn high_account_indices_use_raw_child_numbers() {
        let path = HdPath::new(0, 0x8000_0001).to_derivation_path().unwrap();
        let last = path.iter().last().unwrap();
        assert!(last.is_hardened());
        assert_eq!(last.index(), 1);
    }

    #[test]
    fn parse_tenant_ids() {
        assert_eq!(parse_tenant_id("18682003824").unwrap(), 18682003824);
        assert_eq!(parse_tenant_id(" 42 ").unwrap(), 42);
        for bad in ["", "-1", "12a", "+5", "99999999999999999999999"] {
            assert!(matches!(
                parse_tenant_id(bad),
                Err(KeyServiceError::InvalidIdentifier(_))
            ));
        }
    }
}
