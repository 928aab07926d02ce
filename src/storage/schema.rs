// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistent key layout on top of a [`KvStore`].
//!
//! ## Key Layout
//!
//! Every key is a single type byte followed by 32-byte big-endian hashes:
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `a` | root hash, dapp hash | RLP list of admin addresses (legacy) |
//! | `c` | keccak(root hash, tenant hash) | RLP tenant record |
//! | `d` | root hash | RLP list of tenant hashes |
//! | `e` | any hash | u64 big-endian counter |
//! | `l` | address hash | RLP account lookup (legacy) |
//!
//! A tenant hash is the tenant id left-padded to 32 bytes; a root hash is the
//! root address left-padded to 32 bytes. There is no concurrency control here:
//! the registry lock is the only writer.

use std::sync::Arc;

use alloy::primitives::{keccak256, Address, B256};
use alloy::rlp::{Decodable, Encodable};

use super::codec::{encode_rlp_list, finish_rlp_list, rlp_list_payload};
use super::{KvStore, StorageError, StorageResult};

const ADMIN_LIST_PREFIX: u8 = b'a';
const TENANT_RECORD_PREFIX: u8 = b'c';
const ROOT_TENANTS_PREFIX: u8 = b'd';
const COUNTER_PREFIX: u8 = b'e';
const ACCOUNT_LOOKUP_PREFIX: u8 = b'l';

// =============================================================================
// Hashes and keys
// =============================================================================

/// 32-byte big-endian form of a tenant id.
pub fn tenant_hash(tenant_id: u64) -> B256 {
    B256::left_padding_from(&tenant_id.to_be_bytes())
}

/// Inverse of [`tenant_hash`]; `None` if the hash is wider than 64 bits.
pub fn tenant_id_from_hash(hash: &B256) -> Option<u64> {
    if hash[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[24..]);
    Some(u64::from_be_bytes(bytes))
}

pub fn root_hash(root: &Address) -> B256 {
    root.into_word()
}

/// Record hash scoping a tenant to its root.
pub fn tenant_record_hash(root: &Address, tenant_id: u64) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(root_hash(root).as_slice());
    preimage[32..].copy_from_slice(tenant_hash(tenant_id).as_slice());
    keccak256(preimage)
}

fn key(prefix: u8, hashes: &[&B256]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32 * hashes.len());
    key.push(prefix);
    for hash in hashes {
        key.extend_from_slice(hash.as_slice());
    }
    key
}

// =============================================================================
// Records
// =============================================================================

/// Stored form of a derived tenant account. Holds no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub tenant_id: u64,
    pub address: Address,
    pub namespace: u32,
    pub account: u32,
}

impl TenantRecord {
    pub fn encode(&self) -> Vec<u8> {
        encode_rlp_list(|out| {
            self.tenant_id.encode(out);
            self.address.encode(out);
            self.namespace.encode(out);
            self.account.encode(out);
        })
    }

    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf)?;
        let record = Self {
            tenant_id: u64::decode(&mut payload)?,
            address: Address::decode(&mut payload)?,
            namespace: u32::decode(&mut payload)?,
            account: u32::decode(&mut payload)?,
        };
        finish_rlp_list(payload)?;
        Ok(record)
    }
}

/// Legacy reverse lookup: derived address → owning root and tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLookup {
    pub root_hash: B256,
    pub tenant_id: u64,
}

impl AccountLookup {
    pub fn encode(&self) -> Vec<u8> {
        encode_rlp_list(|out| {
            self.root_hash.encode(out);
            self.tenant_id.encode(out);
        })
    }

    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf)?;
        let lookup = Self {
            root_hash: B256::decode(&mut payload)?,
            tenant_id: u64::decode(&mut payload)?,
        };
        finish_rlp_list(payload)?;
        Ok(lookup)
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Typed accessors over the flat key space.
#[derive(Clone)]
pub struct Schema {
    store: Arc<dyn KvStore>,
}

impl Schema {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    // ========== Counters ==========

    /// Read a counter; missing counters read as zero.
    pub fn read_counter(&self, hash: &B256) -> StorageResult<u64> {
        match self.store.get(&key(COUNTER_PREFIX, &[hash]))? {
            Some(bytes) => {
                let array: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corrupt(format!("counter {hash} has {} bytes", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(array))
            }
            None => Ok(0),
        }
    }

    pub fn write_counter(&self, hash: &B256, count: u64) -> StorageResult<()> {
        self.store
            .put(&key(COUNTER_PREFIX, &[hash]), &count.to_be_bytes())
    }

    pub fn has_counter(&self, hash: &B256) -> StorageResult<bool> {
        self.store.has(&key(COUNTER_PREFIX, &[hash]))
    }

    pub fn delete_counter(&self, hash: &B256) -> StorageResult<()> {
        self.store.delete(&key(COUNTER_PREFIX, &[hash]))
    }

    // ========== Tenant records ==========

    pub fn read_tenant_record(
        &self,
        root: &Address,
        tenant_id: u64,
    ) -> StorageResult<Option<TenantRecord>> {
        let hash = tenant_record_hash(root, tenant_id);
        self.store
            .get(&key(TENANT_RECORD_PREFIX, &[&hash]))?
            .map(|bytes| TenantRecord::decode(&bytes))
            .transpose()
    }

    pub fn write_tenant_record(&self, root: &Address, record: &TenantRecord) -> StorageResult<()> {
        let hash = tenant_record_hash(root, record.tenant_id);
        self.store
            .put(&key(TENANT_RECORD_PREFIX, &[&hash]), &record.encode())
    }

    pub fn has_tenant_record(&self, root: &Address, tenant_id: u64) -> StorageResult<bool> {
        let hash = tenant_record_hash(root, tenant_id);
        self.store.has(&key(TENANT_RECORD_PREFIX, &[&hash]))
    }

    pub fn delete_tenant_record(&self, root: &Address, tenant_id: u64) -> StorageResult<()> {
        let hash = tenant_record_hash(root, tenant_id);
        self.store.delete(&key(TENANT_RECORD_PREFIX, &[&hash]))
    }

    // ========== Root tenant lists ==========

    /// Tenant hashes registered under a root; empty if none were flushed yet.
    pub fn read_root_tenants(&self, root: &Address) -> StorageResult<Vec<B256>> {
        match self.store.get(&key(ROOT_TENANTS_PREFIX, &[&root_hash(root)]))? {
            Some(bytes) => Ok(alloy::rlp::decode_exact::<Vec<B256>>(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn write_root_tenants(&self, root: &Address, tenants: &[B256]) -> StorageResult<()> {
        let mut out: Vec<u8> = Vec::new();
        alloy::rlp::encode_list::<B256, B256>(tenants, &mut out);
        self.store
            .put(&key(ROOT_TENANTS_PREFIX, &[&root_hash(root)]), &out)
    }

    pub fn has_root_tenants(&self, root: &Address) -> StorageResult<bool> {
        self.store.has(&key(ROOT_TENANTS_PREFIX, &[&root_hash(root)]))
    }

    pub fn delete_root_tenants(&self, root: &Address) -> StorageResult<()> {
        self.store
            .delete(&key(ROOT_TENANTS_PREFIX, &[&root_hash(root)]))
    }

    // ========== Legacy admin lists ==========

    pub fn read_admin_list(&self, root: &Address, dapp: &B256) -> StorageResult<Vec<Address>> {
        match self
            .store
            .get(&key(ADMIN_LIST_PREFIX, &[&root_hash(root), dapp]))?
        {
            Some(bytes) => Ok(alloy::rlp::decode_exact::<Vec<Address>>(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn write_admin_list(
        &self,
        root: &Address,
        dapp: &B256,
        admins: &[Address],
    ) -> StorageResult<()> {
        let mut out: Vec<u8> = Vec::new();
        alloy::rlp::encode_list::<Address, Address>(admins, &mut out);
        self.store
            .put(&key(ADMIN_LIST_PREFIX, &[&root_hash(root), dapp]), &out)
    }

    pub fn has_admin_list(&self, root: &Address, dapp: &B256) -> StorageResult<bool> {
        self.store
            .has(&key(ADMIN_LIST_PREFIX, &[&root_hash(root), dapp]))
    }

    pub fn delete_admin_list(&self, root: &Address, dapp: &B256) -> StorageResult<()> {
        self.store
            .delete(&key(ADMIN_LIST_PREFIX, &[&root_hash(root), dapp]))
    }

    // ========== Legacy account lookups ==========

    pub fn read_account_lookup(&self, address: &Address) -> StorageResult<Option<AccountLookup>> {
        self.store
            .get(&key(ACCOUNT_LOOKUP_PREFIX, &[&address.into_word()]))?
            .map(|bytes| AccountLookup::decode(&bytes))
            .transpose()
    }

    pub fn write_account_lookup(
        &self,
        address: &Address,
        lookup: &AccountLookup,
    ) -> StorageResult<()> {
        self.store.put(
            &key(ACCOUNT_LOOKUP_PREFIX, &[&address.into_word()]),
            &lookup.encode(),
        )
    }

    pub fn has_account_lookup(&self, address: &Address) -> StorageResult<bool> {
        self.store
            .has(&key(ACCOUNT_LOOKUP_PREFIX, &[&address.into_word()]))
    }

    pub fn delete_account_lookup(&self, address: &Address) -> StorageResult<()> {
        self.store
            .delete(&key(ACCOUNT_LOOKUP_PREFIX, &[&address.into_word()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use alloy::primitives::address;

    const ROOT: Address = address!("1111111111111111111111111111111111111111");
    const OTHER_ROOT: Address = address!("2222222222222222222222222222222222222222");

    fn schema() -> Schema {
        Schema::new(Arc::new(MemoryStore::new()))
    }

    fn record(tenant_id: u64) -> TenantRecord {
        TenantRecord {
            tenant_id,
            address: address!("00000000000000000000000000000000000000aa"),
            namespace: 186820,
            account: 3824,
        }
    }

    #[test]
    fn tenant_hash_is_big_endian_and_reversible() {
        let hash = tenant_hash(0x0102);
        assert_eq!(hash[30], 0x01);
        assert_eq!(hash[31], 0x02);
        assert!(hash[..30].iter().all(|b| *b == 0));
        assert_eq!(tenant_id_from_hash(&hash), Some(0x0102));
        assert_eq!(tenant_id_from_hash(&B256::repeat_byte(0xff)), None);
    }

    #[test]
    fn keys_are_prefixed_and_uniform() {
        let k = key(TENANT_RECORD_PREFIX, &[&tenant_record_hash(&ROOT, 1)]);
        assert_eq!(k.len(), 33);
        assert_eq!(k[0], b'c');
        assert_ne!(tenant_record_hash(&ROOT, 1), tenant_record_hash(&OTHER_ROOT, 1));
    }

    #[test]
    fn counter_crud() {
        let schema = schema();
        let hash = root_hash(&ROOT);
        assert_eq!(schema.read_counter(&hash).unwrap(), 0);
        assert!(!schema.has_counter(&hash).unwrap());
        schema.write_counter(&hash, 12).unwrap();
        assert_eq!(schema.read_counter(&hash).unwrap(), 12);
        schema.delete_counter(&hash).unwrap();
        assert!(!schema.has_counter(&hash).unwrap());
    }

    #[test]
    fn tenant_record_crud_is_root_scoped() {
        let schema = schema();
        let rec = record(18682003824);
        schema.write_tenant_record(&ROOT, &rec).unwrap();

        assert!(schema.has_tenant_record(&ROOT, rec.tenant_id).unwrap());
        assert!(!schema.has_tenant_record(&OTHER_ROOT, rec.tenant_id).unwrap());
        assert_eq!(
            schema.read_tenant_record(&ROOT, rec.tenant_id).unwrap(),
            Some(rec.clone())
        );

        schema.delete_tenant_record(&ROOT, rec.tenant_id).unwrap();
        assert_eq!(schema.read_tenant_record(&ROOT, rec.tenant_id).unwrap(), None);
    }

    #[test]
    fn root_tenants_crud() {
        let schema = schema();
        assert!(schema.read_root_tenants(&ROOT).unwrap().is_empty());

        let hashes = vec![tenant_hash(1), tenant_hash(42)];
        schema.write_root_tenants(&ROOT, &hashes).unwrap();
        assert!(schema.has_root_tenants(&ROOT).unwrap());
        assert_eq!(schema.read_root_tenants(&ROOT).unwrap(), hashes);

        schema.delete_root_tenants(&ROOT).unwrap();
        assert!(!schema.has_root_tenants(&ROOT).unwrap());
    }

    #[test]
    fn legacy_entities_crud() {
        let schema = schema();
        let dapp = B256::ZERO;
        let admins = vec![OTHER_ROOT];
        schema.write_admin_list(&ROOT, &dapp, &admins).unwrap();
        assert!(schema.has_admin_list(&ROOT, &dapp).unwrap());
        assert_eq!(schema.read_admin_list(&ROOT, &dapp).unwrap(), admins);
        schema.delete_admin_list(&ROOT, &dapp).unwrap();
        assert!(schema.read_admin_list(&ROOT, &dapp).unwrap().is_empty());

        let lookup = AccountLookup {
            root_hash: root_hash(&ROOT),
            tenant_id: 42,
        };
        let addr = record(42).address;
        schema.write_account_lookup(&addr, &lookup).unwrap();
        assert!(schema.has_account_lookup(&addr).unwrap());
        assert_eq!(schema.read_account_lookup(&addr).unwrap(), Some(lookup));
        schema.delete_account_lookup(&addr).unwrap();
        assert_eq!(schema.read_account_lookup(&addr).unwrap(), None);
    }

    #[test]
    fn corrupt_values_surface_as_errors() {
        let store = Arc::new(MemoryStore::new());
        let schema = Schema::new(store.clone());
        store
            .put(&key(COUNTER_PREFIX, &[&B256::ZERO]), b"abc")
            .unwrap();
        assert!(matches!(
            schema.read_counter(&B256::ZERO),
            Err(StorageError::Corrupt(_))
        ));

        store
            .put(&key(ROOT_TENANTS_PREFIX, &[&root_hash(&ROOT)]), &[0xc1])
            .unwrap();
        assert!(matches!(
            schema.read_root_tenants(&ROOT),
            Err(StorageError::Codec(_))
        ));
    }

    #[test]
    fn records_with_extra_fields_are_rejected() {
        let padded = encode_rlp_list(|out| {
            42u64.encode(out);
            record(42).address.encode(out);
            186820u32.encode(out);
            3824u32.encode(out);
            1u8.encode(out);
        });
        assert!(matches!(
            TenantRecord::decode(&padded),
            Err(StorageError::Codec(_))
        ));

        let padded = encode_rlp_list(|out| {
            root_hash(&ROOT).encode(out);
            42u64.encode(out);
            42u64.encode(out);
        });
        assert!(AccountLookup::decode(&padded).is_err());
    }
}
