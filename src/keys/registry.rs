// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Root wallet registry.
//!
//! The registry owns every [`RootWallet`] for the lifetime of the process and is
//! the single choke point for tenant resolution. One coarse mutex guards all
//! tenant maps: at most one registry mutation runs at a time. Tenant keys never
//! leave the registry except as a borrow handed to a closure for the duration
//! of one signing call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, B256};
use k256::ecdsa::SigningKey;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::wallet::{AccountInfo, ChildAccount, MasterKey, RootWallet};
use crate::config::RootConfig;
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::storage::schema::{root_hash, tenant_id_from_hash, AccountLookup};
use crate::storage::{KvStore, Schema, StorageError};

/// Dapp hash under which the legacy admin list is written.
const LEGACY_DAPP: B256 = B256::ZERO;

/// Public summary of a root wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RootInfo {
    #[schema(value_type = String)]
    pub address: Address,
    #[schema(value_type = Vec<String>)]
    pub admins: Vec<Address>,
    pub tenants: usize,
}

/// Result of the shutdown flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub roots: usize,
    pub records_written: usize,
    pub failures: usize,
}

pub struct Registry {
    roots: Mutex<HashMap<Address, RootWallet>>,
    payers: HashMap<Address, SigningKey>,
    schema: Schema,
    derivations: AtomicU64,
    shut_down: AtomicBool,
}

impl Registry {
    /// Build every root wallet from its master key and rehydrate persisted
    /// tenants by re-deriving them.
    ///
    /// Storage failures here are fatal: a registry that cannot read its own
    /// history must not start serving.
    pub fn initialize(
        master_keys: &[MasterKey],
        root_configs: &[RootConfig],
        store: Arc<dyn KvStore>,
    ) -> KeyServiceResult<Self> {
        let schema = Schema::new(store);
        let mut roots = HashMap::with_capacity(master_keys.len());
        let mut payers = HashMap::with_capacity(master_keys.len());

        for master in master_keys {
            roots.insert(master.address(), RootWallet::new(master)?);
            payers.insert(master.address(), master.signing_key().clone());
        }

        for config in root_configs {
            let Some(wallet) = roots.get_mut(&config.root) else {
                warn!(root = %config.root, "Configured root has no loaded master key, skipping");
                continue;
            };
            wallet.add_admins(config.admins.iter().copied());
            schema.write_admin_list(&config.root, &LEGACY_DAPP, &wallet.admins())?;
        }

        for wallet in roots.values_mut() {
            let restored = rehydrate(wallet, &schema)?;
            info!(
                root = %wallet.address(),
                tenants = restored,
                admins = wallet.admins().len(),
                "Root wallet loaded"
            );
        }

        Ok(Self {
            roots: Mutex::new(roots),
            payers,
            schema,
            derivations: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Address, RootWallet>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a tenant, deriving and persisting its account on first use.
    ///
    /// Idempotent: concurrent registrations of one tenant converge on a single
    /// account and only the first performs a derivation.
    pub fn resolve_or_create(&self, root: Address, tenant_id: u64) -> KeyServiceResult<AccountInfo> {
        let mut roots = self.lock();
        let account = self.account_in(&mut roots, root, tenant_id)?;
        Ok(account.info(root))
    }

    /// Look up an already registered tenant without deriving.
    pub fn resolve(&self, root: Address, tenant_id: u64) -> KeyServiceResult<Option<AccountInfo>> {
        let roots = self.lock();
        let wallet = roots.get(&root).ok_or(KeyServiceError::UnknownRoot(root))?;
        Ok(wallet.get(tenant_id).map(|account| account.info(root)))
    }

    pub fn resolve_root(&self, root: Address) -> KeyServiceResult<RootInfo> {
        let roots = self.lock();
        let wallet = roots.get(&root).ok_or(KeyServiceError::UnknownRoot(root))?;
        Ok(RootInfo {
            address: root,
            admins: wallet.admins(),
            tenants: wallet.len(),
        })
    }

    /// Loaded root addresses in address order.
    pub fn roots(&self) -> Vec<Address> {
        let mut roots: Vec<Address> = self.lock().keys().copied().collect();
        roots.sort();
        roots
    }

    pub fn is_trusted_admin(&self, root: Address, admin: &Address) -> KeyServiceResult<bool> {
        let roots = self.lock();
        let wallet = roots.get(&root).ok_or(KeyServiceError::UnknownRoot(root))?;
        Ok(wallet.is_admin(admin))
    }

    pub fn has_payer(&self, payer: &Address) -> bool {
        self.payers.contains_key(payer)
    }

    /// Run `f` with a tenant's signing key, resolving the tenant first.
    ///
    /// The key is only borrowed for the duration of the call, under the
    /// registry lock.
    pub fn with_tenant_key<R>(
        &self,
        root: Address,
        tenant_id: u64,
        f: impl FnOnce(&AccountInfo, &SigningKey) -> R,
    ) -> KeyServiceResult<R> {
        let mut roots = self.lock();
        let account = self.account_in(&mut roots, root, tenant_id)?;
        Ok(f(&account.info(root), account.signing_key()))
    }

    /// Run `f` with a fee payer's master key.
    pub fn with_payer_key<R>(
        &self,
        payer: Address,
        f: impl FnOnce(&SigningKey) -> R,
    ) -> KeyServiceResult<R> {
        let key = self
            .payers
            .get(&payer)
            .ok_or(KeyServiceError::UnknownPayer(payer))?;
        Ok(f(key))
    }

    /// Number of fresh derivations performed since startup. Rehydrated
    /// tenants are not counted.
    pub fn derivations(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Flush every root's accounts and tenant list. Runs once; later calls
    /// return `None`. Write failures are logged, never raised.
    pub fn shutdown(&self) -> Option<ShutdownReport> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            warn!("Registry shutdown requested twice, ignoring");
            return None;
        }

        let mut roots = self.lock();
        let mut report = ShutdownReport::default();
        for wallet in roots.values_mut() {
            let outcome = wallet.flush(&self.schema);
            report.roots += 1;
            report.records_written += outcome.records_written;
            report.failures += outcome.failures;
        }

        if report.failures > 0 {
            warn!(
                roots = report.roots,
                records_written = report.records_written,
                failures = report.failures,
                "Registry flushed with failures"
            );
        } else {
            info!(
                roots = report.roots,
                records_written = report.records_written,
                "Registry flushed"
            );
        }
        Some(report)
    }

    /// Insert-if-absent under the held lock. Nothing is inserted unless the
    /// derivation and the record write both succeed.
    fn account_in<'a>(
        &self,
        roots: &'a mut HashMap<Address, RootWallet>,
        root: Address,
        tenant_id: u64,
    ) -> KeyServiceResult<&'a ChildAccount> {
        if self.is_shut_down() {
            return Err(KeyServiceError::InvalidState("registry is shut down"));
        }
        let wallet = roots
            .get_mut(&root)
            .ok_or(KeyServiceError::UnknownRoot(root))?;

        if wallet.get(tenant_id).is_none() {
            let account = wallet.derive(tenant_id)?;
            self.derivations.fetch_add(1, Ordering::Relaxed);

            if let Some(owner) = self.schema.read_account_lookup(&account.address())? {
                if owner.root_hash == root_hash(&root) && owner.tenant_id != tenant_id {
                    return Err(KeyServiceError::DerivationFailed(format!(
                        "path {} of tenant {tenant_id} is already assigned to tenant {}",
                        account.path(),
                        owner.tenant_id
                    )));
                }
            }

            wallet.check_vacant(&account)?;
            let address = account.address();
            let lookup = AccountLookup {
                root_hash: root_hash(&root),
                tenant_id,
            };
            self.schema.write_tenant_record(&root, &account.record())?;
            self.schema.write_account_lookup(&address, &lookup)?;
            wallet.insert(account, true)?;

            info!(root = %root, tenant_id, address = %address, "Tenant account derived");
        }

        wallet
            .get(tenant_id)
            .ok_or(KeyServiceError::InvalidState("tenant vanished after insert"))
    }
}

/// Re-derive every tenant listed under a root, checking stored records
/// against the fresh derivation.
fn rehydrate(wallet: &mut RootWallet, schema: &Schema) -> KeyServiceResult<usize> {
    let root = wallet.address();
    let hashes = schema.read_root_tenants(&root)?;

    for hash in &hashes {
        let tenant_id = tenant_id_from_hash(hash)
            .ok_or_else(|| StorageError::Corrupt(format!("tenant hash {hash} under {root}")))?;
        let account = wallet.derive(tenant_id)?;

        let record = schema.read_tenant_record(&root, tenant_id)?;
        if let Some(record) = &record {
            if record.address != account.address() {
                return Err(StorageError::Corrupt(format!(
                    "tenant {tenant_id} under {root} stored as {}, derives to {}",
                    record.address,
                    account.address()
                ))
                .into());
            }
        }
        wallet.insert(account, record.is_some())?;
    }

    Ok(hashes.len())
}
