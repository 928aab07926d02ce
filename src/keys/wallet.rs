// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Root wallets and the tenant accounts derived from them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use alloy::primitives::Address;
use bip32::XPrv;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::path::{derive_path, HdPath};
use crate::crypto::pubkey_to_address;
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::storage::codec::ordered_sequence;
use crate::storage::schema::{root_hash, tenant_hash, AccountLookup};
use crate::storage::{Schema, TenantRecord};

/// A decrypted master key handed over by the keystore.
#[derive(Clone)]
pub struct MasterKey {
    address: Address,
    key: SigningKey,
}

impl MasterKey {
    pub fn new(key: SigningKey) -> Self {
        let address = pubkey_to_address(key.verifying_key());
        Self { address, key }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Public view of a tenant account, safe to return to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Root wallet the tenant belongs to.
    #[schema(value_type = String)]
    pub root: Address,
    pub tenant_id: u64,
    /// Derived EVM address.
    #[schema(value_type = String)]
    pub address: Address,
    /// BIP-32 derivation path.
    pub path: String,
}

/// A tenant's derived key. Immutable once derived.
pub struct ChildAccount {
    tenant_id: u64,
    address: Address,
    path: HdPath,
    key: SigningKey,
}

impl ChildAccount {
    pub fn tenant_id(&self) -> u64 {
        self.tenant_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn path(&self) -> HdPath {
        self.path
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn info(&self, root: Address) -> AccountInfo {
        AccountInfo {
            root,
            tenant_id: self.tenant_id,
            address: self.address,
            path: self.path.to_string(),
        }
    }

    pub fn record(&self) -> TenantRecord {
        TenantRecord {
            tenant_id: self.tenant_id,
            address: self.address,
            namespace: self.path.namespace(),
            account: self.path.account(),
        }
    }
}

impl fmt::Debug for ChildAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildAccount")
            .field("tenant_id", &self.tenant_id)
            .field("address", &self.address)
            .field("path", &self.path.to_string())
            .finish_non_exhaustive()
    }
}

/// Outcome of writing one root's accounts to storage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub records_written: usize,
    pub failures: usize,
}

/// One administrative HD root and its tenant arena.
pub struct RootWallet {
    address: Address,
    master: XPrv,
    admins: HashSet<Address>,
    accounts: HashMap<u64, ChildAccount>,
    owners: HashMap<Address, u64>,
    persisted: HashSet<u64>,
}

impl RootWallet {
    /// Build the HD root, seeding BIP-32 with the raw master key bytes.
    pub fn new(master: &MasterKey) -> KeyServiceResult<Self> {
        let seed = master.signing_key().to_bytes();
        let master_xprv = XPrv::new(seed.as_slice())
            .map_err(|e| KeyServiceError::DerivationFailed(format!("master key: {e}")))?;

        Ok(Self {
            address: master.address(),
            master: master_xprv,
            admins: HashSet::new(),
            accounts: HashMap::new(),
            owners: HashMap::new(),
            persisted: HashSet::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn add_admins(&mut self, admins: impl IntoIterator<Item = Address>) {
        self.admins.extend(admins);
    }

    pub fn is_admin(&self, admin: &Address) -> bool {
        self.admins.contains(admin)
    }

    /// Trusted admins in address order.
    pub fn admins(&self) -> Vec<Address> {
        let mut admins: Vec<Address> = self.admins.iter().copied().collect();
        admins.sort();
        admins
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, tenant_id: u64) -> Option<&ChildAccount> {
        self.accounts.get(&tenant_id)
    }

    /// Derive a tenant's account without touching the arena.
    pub fn derive(&self, tenant_id: u64) -> KeyServiceResult<ChildAccount> {
        let path = derive_path(tenant_id)?;
        let xprv = path
            .to_derivation_path()?
            .iter()
            .try_fold(self.master.clone(), |key, child| key.derive_child(child))
            .map_err(|e| KeyServiceError::DerivationFailed(format!("{path}: {e}")))?;

        let key = xprv.private_key().clone();
        let address = pubkey_to_address(key.verifying_key());
        Ok(ChildAccount {
            tenant_id,
            address,
            path,
            key,
        })
    }

    /// Fails if the account's address already belongs to another tenant.
    pub fn check_vacant(&self, account: &ChildAccount) -> KeyServiceResult<()> {
        match self.owners.get(&account.address) {
            Some(owner) if *owner != account.tenant_id => {
                Err(KeyServiceError::DerivationFailed(format!(
                    "path {} of tenant {} is already assigned to tenant {owner}",
                    account.path, account.tenant_id
                )))
            }
            _ => Ok(()),
        }
    }

    /// Insert a freshly derived account.
    ///
    /// Two ids can split onto the same path (e.g. `18682003824` and
    /// `186820003824`); the second one is refused rather than sharing a key.
    pub fn insert(
        &mut self,
        account: ChildAccount,
        persisted: bool,
    ) -> KeyServiceResult<&ChildAccount> {
        self.check_vacant(&account)?;

        let tenant_id = account.tenant_id;
        self.owners.insert(account.address, tenant_id);
        if persisted {
            self.persisted.insert(tenant_id);
        }
        Ok(self.accounts.entry(tenant_id).or_insert(account))
    }

    /// Write every account missing from storage, then the full tenant list
    /// and tenant counter. Failures are logged and counted, never raised.
    pub fn flush(&mut self, schema: &Schema) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        let root = self.address;
        let root_word = root_hash(&root);

        for (tenant_id, account) in ordered_sequence(&self.accounts) {
            if self.persisted.contains(&tenant_id) {
                continue;
            }
            let lookup = AccountLookup {
                root_hash: root_word,
                tenant_id,
            };
            let written = schema
                .write_tenant_record(&root, &account.record())
                .and_then(|_| schema.write_account_lookup(&account.address, &lookup));
            match written {
                Ok(()) => {
                    self.persisted.insert(tenant_id);
                    outcome.records_written += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        root = %root,
                        tenant_id,
                        error = %e,
                        "Failed to persist tenant record"
                    );
                    outcome.failures += 1;
                }
            }
        }

        let tenants: Vec<_> = ordered_sequence(&self.accounts)
            .into_iter()
            .map(|(tenant_id, _)| tenant_hash(tenant_id))
            .collect();
        if let Err(e) = schema.write_root_tenants(&root, &tenants) {
            tracing::warn!(root = %root, error = %e, "Failed to persist tenant list");
            outcome.failures += 1;
        }
        if let Err(e) = schema.write_counter(&root_word, tenants.len() as u64) {
            tracing::warn!(root = %root, error = %e, "Failed to persist tenant counter");
            outcome.failures += 1;
        }

        outcome
    }
}
